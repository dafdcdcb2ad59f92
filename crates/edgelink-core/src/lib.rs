//! Shared model types for the EdgeLink device service runtime.
//!
//! This crate holds everything the runtime crates agree on: the catalog
//! model mirrored from Core Metadata (devices, profiles, provision
//! watchers), the typed value carrier exchanged with protocol drivers,
//! the service error taxonomy, and TOML configuration loading.

pub mod config;
pub mod error;
pub mod models;
pub mod value;
pub mod wire;

pub use config::{ClientConfig, Config, ConfigError, ServiceConfig};
pub use error::{SvcError, SvcResult};
pub use models::{
    AdminState, Addressable, AutoEvent, CallbackAction, CallbackAlert, Device, DeviceProfile,
    DeviceResource, DeviceServiceRecord, Event, OperatingState, ProtocolMap, ProtocolProperties,
    ProvisionWatcher, Reading, ResourceKind, ResourceOperation, ValueDescriptor, ValueSpec,
};
pub use value::{CommandValue, ValuePayload};
pub use wire::{PrimaryTable, WireSpec, WireType};

/// Route prefix shared by the inbound surface and all Core clients.
pub const API_PREFIX: &str = "/api/v1";
