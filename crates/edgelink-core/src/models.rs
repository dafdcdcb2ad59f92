//! Catalog model mirrored from Core Metadata.
//!
//! Devices reference their profile by name only; the cycle between device
//! and profile objects is resolved through cache lookups, never through
//! embedded copies.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SvcError, SvcResult};

/// Protocol-specific key/value properties, e.g. `{Host, Port}` for a
/// Modbus TCP endpoint.
pub type ProtocolProperties = HashMap<String, String>;

/// Protocol name to properties, e.g. `"ModbusTCP" -> {Host, Port}`.
pub type ProtocolMap = HashMap<String, ProtocolProperties>;

/// Runtime liveness of a device, distinct from its admin state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingState {
    #[serde(rename = "ENABLED")]
    Enabled,
    #[serde(rename = "DISABLED")]
    Disabled,
}

impl Default for OperatingState {
    fn default() -> Self {
        Self::Enabled
    }
}

impl std::fmt::Display for OperatingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled => write!(f, "ENABLED"),
            Self::Disabled => write!(f, "DISABLED"),
        }
    }
}

/// Administrative lock state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminState {
    #[serde(rename = "LOCKED")]
    Locked,
    #[serde(rename = "UNLOCKED")]
    Unlocked,
}

impl Default for AdminState {
    fn default() -> Self {
        Self::Unlocked
    }
}

/// Scheduled periodic read of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoEvent {
    /// Resource to read on every tick.
    pub resource: String,
    /// Tick period as a duration string, e.g. `"500ms"`, `"10s"`, `"1m"`.
    pub frequency: String,
    /// Suppress the reading when the value did not change since last tick.
    #[serde(default)]
    pub on_change: bool,
}

impl AutoEvent {
    /// Parse the frequency string into a concrete period.
    pub fn interval(&self) -> SvcResult<Duration> {
        parse_duration(&self.frequency).ok_or_else(|| {
            SvcError::bad_request(format!(
                "invalid auto event frequency {:?} for resource {}",
                self.frequency, self.resource
            ))
        })
    }
}

/// Parse `"250ms"`, `"10s"`, `"5m"` or `"1h"` into a [`Duration`].
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let (num, unit) = s.split_at(split);
    let num: u64 = num.parse().ok()?;
    if num == 0 {
        return None;
    }
    match unit {
        "ms" => Some(Duration::from_millis(num)),
        "s" => Some(Duration::from_secs(num)),
        "m" => Some(Duration::from_secs(num * 60)),
        "h" => Some(Duration::from_secs(num * 3600)),
        _ => None,
    }
}

/// A registered device instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Opaque identifier assigned by Core Metadata.
    #[serde(default)]
    pub id: String,
    /// Unique device name.
    pub name: String,
    /// Name of the profile describing this device's resources.
    pub profile_name: String,
    #[serde(default)]
    pub description: String,
    /// Transport endpoints, keyed by protocol name.
    #[serde(default)]
    pub protocols: ProtocolMap,
    #[serde(default)]
    pub operating_state: OperatingState,
    #[serde(default)]
    pub admin_state: AdminState,
    /// Scheduled reads installed while the device is unlocked.
    #[serde(default)]
    pub auto_events: Vec<AutoEvent>,
}

impl Device {
    pub fn is_locked(&self) -> bool {
        self.admin_state == AdminState::Locked
    }
}

/// Value shape of a device resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Bool,
    String,
    Integer,
    Float,
    Json,
}

/// Declared value type of a resource, with optional rendering hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSpec {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// Decimal places kept when rounding float results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i32>,
    #[serde(default = "default_writable")]
    pub writable: bool,
}

fn default_writable() -> bool {
    true
}

/// A named atomic readable/writable attribute on a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResource {
    pub name: String,
    /// Driver-specific attributes (register table, address, wire type...),
    /// opaque to the catalog and parsed into a typed descriptor at profile
    /// load time.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub value: ValueSpec,
}

/// One elementary step within a higher-level device command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOperation {
    pub resource_name: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl ResourceOperation {
    pub fn new(resource_name: impl Into<String>, index: u32) -> Self {
        Self {
            resource_name: resource_name.into(),
            index,
            parameter: None,
        }
    }
}

/// Named description of a class of devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    pub name: String,
    /// Resources keyed by resource name.
    #[serde(default)]
    pub device_resources: HashMap<String, DeviceResource>,
    /// Multi-step commands keyed by command name, each an ordered
    /// sequence of resource operations.
    #[serde(default)]
    pub device_commands: HashMap<String, Vec<ResourceOperation>>,
    /// Command names exposed northbound.
    #[serde(default)]
    pub core_commands: HashSet<String>,
}

/// Rule that turns discovery matches into device creations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionWatcher {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub profile_name: String,
    /// Identifier key to regex pattern; a candidate matches when every
    /// pattern matches the candidate's identifier of the same key.
    #[serde(default)]
    pub identifiers: HashMap<String, String>,
}

/// How to reach something over the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Addressable {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub protocol: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub path: String,
}

impl Addressable {
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol.to_lowercase(),
            self.address,
            self.port,
            self.path
        )
    }
}

/// The device service's own registration record in Core Metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceServiceRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub addressable: Addressable,
    #[serde(default)]
    pub admin_state: AdminState,
}

/// Declared value shape pushed to Core Data alongside new profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// One sampled value of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub name: String,
    pub value: String,
    /// Unix milliseconds at which the value was produced.
    pub origin: i64,
}

/// A batch of readings for one device, forwarded to Core Data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub device: String,
    pub origin: i64,
    pub readings: Vec<Reading>,
}

/// Catalog dimension a callback refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackAction {
    #[serde(rename = "DEVICE")]
    Device,
    #[serde(rename = "PROFILE")]
    Profile,
    /// Anything else Core might send; rejected as a bad request.
    #[serde(other)]
    Unknown,
}

/// Inbound notification that the Core catalog changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAlert {
    pub id: String,
    pub action_type: CallbackAction,
}
