//! Runtime kernel of the EdgeLink device service.
//!
//! The kernel sits between a southbound protocol driver and the northbound
//! Core services. It mirrors the Core catalog in an in-memory [`cache`],
//! applies live catalog updates through the [`callback`] reconciler, polls
//! resources on schedule via the [`autoevent`] manager, and translates
//! named commands into driver calls in the [`dispatch`] module.
//!
//! Everything is wired together by [`bootstrap`], which returns a
//! [`Runtime`] context that the HTTP surface in [`http`] serves from. No
//! component touches global mutable state.

pub mod autoevent;
pub mod bootstrap;
pub mod cache;
pub mod callback;
pub mod cron;
pub mod dispatch;
pub mod driver;
pub mod http;
pub mod provision;
pub mod transform;

pub use bootstrap::{bootstrap, BootstrapError, Runtime};
pub use dispatch::{CommandDispatcher, CommandMethod};
pub use driver::{
    AsyncReadings, CommandRequest, DiscoveredCandidate, DriverError, DriverResult, DriverSinks,
    ProtocolDriver,
};

/// Fresh correlation id for a unit of work crossing into Core.
pub fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
