//! Typed clients for the Core Metadata endpoints.

use edgelink_core::models::{
    Addressable, Device, DeviceProfile, DeviceServiceRecord, OperatingState, ProvisionWatcher,
};
use edgelink_core::API_PREFIX;

use crate::transport::{ClientResult, Transport};

/// `/api/v1/device` operations.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    transport: Transport,
}

impl DeviceClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Fetch one device by its Core id.
    pub async fn device(&self, id: &str, correlation: &str) -> ClientResult<Device> {
        self.transport
            .get_json(&format!("{}/device/{}", API_PREFIX, id), correlation)
            .await
    }

    /// Fetch every device registered to this service.
    pub async fn devices_for_service(
        &self,
        service_name: &str,
        correlation: &str,
    ) -> ClientResult<Vec<Device>> {
        self.transport
            .get_json(
                &format!("{}/device/servicename/{}", API_PREFIX, service_name),
                correlation,
            )
            .await
    }

    /// Create a device; Core answers its new id.
    pub async fn add(&self, device: &Device, correlation: &str) -> ClientResult<String> {
        self.transport
            .post_json(&format!("{}/device", API_PREFIX), device, correlation)
            .await
    }

    /// Persist an operating-state transition.
    pub async fn update_op_state_by_name(
        &self,
        name: &str,
        state: OperatingState,
        correlation: &str,
    ) -> ClientResult<()> {
        self.transport
            .put_empty(
                &format!("{}/device/opstate/name/{}/{}", API_PREFIX, name, state),
                correlation,
            )
            .await
    }
}

/// `/api/v1/deviceprofile` operations.
#[derive(Debug, Clone)]
pub struct DeviceProfileClient {
    transport: Transport,
}

impl DeviceProfileClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn profile(&self, id: &str, correlation: &str) -> ClientResult<DeviceProfile> {
        self.transport
            .get_json(&format!("{}/deviceprofile/{}", API_PREFIX, id), correlation)
            .await
    }

    pub async fn profile_for_name(
        &self,
        name: &str,
        correlation: &str,
    ) -> ClientResult<DeviceProfile> {
        self.transport
            .get_json(
                &format!("{}/deviceprofile/name/{}", API_PREFIX, name),
                correlation,
            )
            .await
    }
}

/// `/api/v1/provisionwatcher` operations.
#[derive(Debug, Clone)]
pub struct ProvisionWatcherClient {
    transport: Transport,
}

impl ProvisionWatcherClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn watchers_for_service(
        &self,
        service_name: &str,
        correlation: &str,
    ) -> ClientResult<Vec<ProvisionWatcher>> {
        self.transport
            .get_json(
                &format!("{}/provisionwatcher/servicename/{}", API_PREFIX, service_name),
                correlation,
            )
            .await
    }
}

/// `/api/v1/deviceservice` operations.
#[derive(Debug, Clone)]
pub struct DeviceServiceClient {
    transport: Transport,
}

impl DeviceServiceClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn device_service_for_name(
        &self,
        name: &str,
        correlation: &str,
    ) -> ClientResult<DeviceServiceRecord> {
        self.transport
            .get_json(
                &format!("{}/deviceservice/name/{}", API_PREFIX, name),
                correlation,
            )
            .await
    }

    pub async fn add(
        &self,
        record: &DeviceServiceRecord,
        correlation: &str,
    ) -> ClientResult<String> {
        self.transport
            .post_json(&format!("{}/deviceservice", API_PREFIX), record, correlation)
            .await
    }

    pub async fn update(
        &self,
        record: &DeviceServiceRecord,
        correlation: &str,
    ) -> ClientResult<()> {
        self.transport
            .put_json(&format!("{}/deviceservice", API_PREFIX), record, correlation)
            .await
    }
}

/// `/api/v1/addressable` operations.
#[derive(Debug, Clone)]
pub struct AddressableClient {
    transport: Transport,
}

impl AddressableClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn addressable_for_name(
        &self,
        name: &str,
        correlation: &str,
    ) -> ClientResult<Addressable> {
        self.transport
            .get_json(
                &format!("{}/addressable/name/{}", API_PREFIX, name),
                correlation,
            )
            .await
    }

    pub async fn add(&self, addressable: &Addressable, correlation: &str) -> ClientResult<String> {
        self.transport
            .post_json(&format!("{}/addressable", API_PREFIX), addressable, correlation)
            .await
    }
}
