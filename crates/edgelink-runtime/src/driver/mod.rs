//! Protocol driver contract.
//!
//! Drivers are the only component talking to physical devices. The
//! dispatcher guarantees serialized calls per device; a driver moving
//! multiple devices over one bus additionally serializes per transport
//! handle through [`HandlePool`].

mod pool;
pub mod sim;

pub use pool::HandlePool;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use edgelink_core::models::{DeviceResource, ProtocolMap, ResourceOperation};
use edgelink_core::value::CommandValue;
use edgelink_core::wire::WireSpec;
use edgelink_core::SvcError;

/// Result alias for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Driver failure classes; the dispatcher's retry and operating-state
/// policies key off these.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    /// The device did not answer in time. Retryable, and flips the
    /// device's operating state when the retries run out.
    #[error("device timeout: {0}")]
    Timeout(String),

    /// Transient bus failure (CRC error, connection reset). Retryable.
    #[error("transient bus failure: {0}")]
    Transient(String),

    /// Protocol-level rejection (e.g. illegal data address). Not retried.
    #[error("permanent protocol failure: {0}")]
    Permanent(String),
}

impl DriverError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<DriverError> for SvcError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Timeout(msg) | DriverError::Transient(msg) => {
                SvcError::DriverTransient(msg)
            }
            DriverError::Permanent(msg) => SvcError::DriverPermanent(msg),
        }
    }
}

/// One elementary read or write handed to the driver.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub operation: ResourceOperation,
    pub resource: DeviceResource,
    /// Typed register descriptor, present when the profile declares wire
    /// attributes for this resource.
    pub wire: Option<WireSpec>,
}

/// Unsolicited readings a driver pushes through its async sink.
#[derive(Debug, Clone)]
pub struct AsyncReadings {
    pub device_name: String,
    pub values: Vec<CommandValue>,
}

/// One device candidate found by discovery: raw identifiers to match
/// against provision watchers, and the protocol properties to reach it.
#[derive(Debug, Clone)]
pub struct DiscoveredCandidate {
    pub identifiers: HashMap<String, String>,
    pub protocols: ProtocolMap,
}

/// Channels handed to a driver at initialization. Unsolicited readings
/// flow to Core Data; discovery candidates flow into the provisioning
/// pipeline.
#[derive(Debug, Clone)]
pub struct DriverSinks {
    pub readings: mpsc::Sender<AsyncReadings>,
    pub discovered: mpsc::Sender<Vec<DiscoveredCandidate>>,
}

/// Capability surface consumed by the dispatcher and the scheduler.
///
/// Implementations must tolerate concurrent calls for distinct devices;
/// calls for one device are serialized by the dispatcher.
#[async_trait]
pub trait ProtocolDriver: Send + Sync {
    /// Called once at bootstrap, before any other method.
    async fn initialize(&self, sinks: DriverSinks) -> DriverResult<()>;

    /// Execute the given read operations, answering values in request
    /// order.
    async fn handle_read_commands(
        &self,
        device_name: &str,
        protocols: &ProtocolMap,
        requests: &[CommandRequest],
    ) -> DriverResult<Vec<CommandValue>>;

    /// Execute the given write operations; `values` pairs up with
    /// `requests` by position.
    async fn handle_write_commands(
        &self,
        device_name: &str,
        protocols: &ProtocolMap,
        requests: &[CommandRequest],
        values: &[CommandValue],
    ) -> DriverResult<()>;

    /// Protocol-specific cleanup when a device leaves the service.
    async fn disconnect_device(&self, device_name: &str, protocols: &ProtocolMap)
        -> DriverResult<()>;

    /// Trigger protocol-specific discovery. Candidates are pushed through
    /// the provisioning pipeline, never returned.
    async fn discover(&self) -> DriverResult<()>;

    /// Shut down; `force` skips draining in-flight transactions.
    async fn stop(&self, force: bool) -> DriverResult<()>;
}
