//! Process-wide in-memory mirror of the Core catalog.
//!
//! Three parallel collections guarded by one lock each. Mutations within a
//! collection are serializable; cross-collection consistency (a device's
//! profile being present before the device) is the caller's job. Nothing
//! in here performs I/O, so no lock is ever held across a driver call.

mod devices;
mod profiles;
mod watchers;

pub use devices::DeviceStore;
pub use profiles::{CachedProfile, ProfileStore};
pub use watchers::{CachedWatcher, WatcherStore};

/// The three catalog collections.
#[derive(Default)]
pub struct Cache {
    pub devices: DeviceStore,
    pub profiles: ProfileStore,
    pub watchers: WatcherStore,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }
}
