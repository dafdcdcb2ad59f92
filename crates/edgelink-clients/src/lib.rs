//! Typed HTTP clients for the Core services.
//!
//! One thin client struct per Core endpoint, all sharing a [`Transport`]
//! that owns the `reqwest::Client` and the base URL. Every request carries
//! the caller's correlation id so Core logs line up with ours.

mod coredata;
mod metadata;
mod transport;

pub use coredata::{EventClient, ValueDescriptorClient};
pub use metadata::{
    AddressableClient, DeviceClient, DeviceProfileClient, DeviceServiceClient,
    ProvisionWatcherClient,
};
pub use transport::{ClientError, ClientResult, Transport};

use std::time::Duration;

use edgelink_core::config::ClientConfig;
use edgelink_core::API_PREFIX;

/// Header propagating the correlation id into Core.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Every typed client for one Core Metadata endpoint set plus Core Data.
#[derive(Clone)]
pub struct CoreClients {
    pub device: DeviceClient,
    pub profile: DeviceProfileClient,
    pub watcher: ProvisionWatcherClient,
    pub device_service: DeviceServiceClient,
    pub addressable: AddressableClient,
    pub event: EventClient,
    pub value_descriptor: ValueDescriptorClient,
}

impl CoreClients {
    /// Build the full client set from the configured endpoints.
    pub fn new(metadata: &ClientConfig, data: &ClientConfig) -> ClientResult<Self> {
        let metadata = Transport::new(&metadata.url(), Duration::from_millis(metadata.timeout))?;
        let data = Transport::new(&data.url(), Duration::from_millis(data.timeout))?;
        Ok(Self {
            device: DeviceClient::new(metadata.clone()),
            profile: DeviceProfileClient::new(metadata.clone()),
            watcher: ProvisionWatcherClient::new(metadata.clone()),
            device_service: DeviceServiceClient::new(metadata.clone()),
            addressable: AddressableClient::new(metadata),
            event: EventClient::new(data.clone()),
            value_descriptor: ValueDescriptorClient::new(data),
        })
    }
}

/// Probe `<base>/api/v1/ping`; used by the bootstrap dependency check.
pub async fn ping(base_url: &str, timeout: Duration) -> ClientResult<()> {
    let transport = Transport::new(base_url, timeout)?;
    transport.get_text(&format!("{}/ping", API_PREFIX)).await?;
    Ok(())
}
