//! Typed clients for the Core Data endpoints.

use edgelink_core::models::{Event, ValueDescriptor};
use edgelink_core::API_PREFIX;

use crate::transport::{ClientResult, Transport};

/// `/api/v1/event` operations.
#[derive(Debug, Clone)]
pub struct EventClient {
    transport: Transport,
}

impl EventClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Forward one event; readings are stored by Core and forgotten here.
    pub async fn add(&self, event: &Event, correlation: &str) -> ClientResult<String> {
        self.transport
            .post_json(&format!("{}/event", API_PREFIX), event, correlation)
            .await
    }
}

/// `/api/v1/valuedescriptor` operations.
#[derive(Debug, Clone)]
pub struct ValueDescriptorClient {
    transport: Transport,
}

impl ValueDescriptorClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn add(
        &self,
        descriptor: &ValueDescriptor,
        correlation: &str,
    ) -> ClientResult<String> {
        self.transport
            .post_json(
                &format!("{}/valuedescriptor", API_PREFIX),
                descriptor,
                correlation,
            )
            .await
    }
}
