//! Simulated protocol driver.
//!
//! Stands in for a real transport during development and demos: reads
//! answer the last written value, or a deterministic pattern derived from
//! the register address. Transactions still go through the shared
//! [`HandlePool`] so the per-bus serialization behaves like a real driver.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use edgelink_core::models::{ProtocolMap, ResourceKind};
use edgelink_core::value::CommandValue;
use edgelink_core::wire::WireType;

use super::{CommandRequest, DriverError, DriverResult, DriverSinks, HandlePool, ProtocolDriver};
use crate::transform;

/// In-memory register bank standing in for real devices.
pub struct SimDriver {
    /// Last written value per (device, resource).
    written: RwLock<HashMap<(String, String), CommandValue>>,
    handles: HandlePool<()>,
    sinks: Mutex<Option<DriverSinks>>,
}

impl SimDriver {
    pub fn new() -> Self {
        Self {
            written: RwLock::new(HashMap::new()),
            handles: HandlePool::new(),
            sinks: Mutex::new(None),
        }
    }

    /// Transport key: TCP endpoint, serial address, or the device name for
    /// protocol-less devices.
    fn handle_key(device_name: &str, protocols: &ProtocolMap) -> String {
        if let Some(tcp) = protocols.get("ModbusTCP") {
            if let (Some(host), Some(port)) = (tcp.get("Host"), tcp.get("Port")) {
                return format!("{}:{}", host, port);
            }
        }
        if let Some(rtu) = protocols.get("ModbusRTU") {
            if let Some(address) = rtu.get("Address") {
                return address.clone();
            }
        }
        device_name.to_string()
    }

    fn default_value(request: &CommandRequest, origin: i64) -> CommandValue {
        let name = &request.operation.resource_name;
        match &request.wire {
            Some(spec) => {
                // Pattern: the register address repeated across the payload,
                // stable across reads so on-change filters settle.
                let mut bytes = vec![0u8; spec.byte_len()];
                let addr = spec.address.to_be_bytes();
                for (i, b) in bytes.iter_mut().enumerate() {
                    *b = addr[i % 2];
                }
                if spec.value_type == WireType::Bool {
                    bytes = vec![0, 1];
                }
                CommandValue::new_binary(name.clone(), origin, spec.value_type, bytes)
            }
            None => match request.resource.value.kind {
                ResourceKind::Bool => CommandValue::new_bool(name.clone(), origin, true),
                ResourceKind::Float => CommandValue::new_f64(name.clone(), origin, 0.0),
                ResourceKind::Integer => CommandValue::new_i64(name.clone(), origin, 0),
                ResourceKind::String | ResourceKind::Json => {
                    CommandValue::new_string(name.clone(), origin, "")
                }
            },
        }
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolDriver for SimDriver {
    async fn initialize(&self, sinks: DriverSinks) -> DriverResult<()> {
        *self.sinks.lock().await = Some(sinks);
        info!("simulated driver initialized");
        Ok(())
    }

    async fn handle_read_commands(
        &self,
        device_name: &str,
        protocols: &ProtocolMap,
        requests: &[CommandRequest],
    ) -> DriverResult<Vec<CommandValue>> {
        let handle = self
            .handles
            .handle(&Self::handle_key(device_name, protocols), || ())
            .await;
        let _bus = handle.lock().await;

        let origin = chrono::Utc::now().timestamp_millis();
        let written = self.written.read().await;
        let mut values = Vec::with_capacity(requests.len());
        for request in requests {
            let key = (
                device_name.to_string(),
                request.operation.resource_name.clone(),
            );
            let value = match written.get(&key) {
                Some(stored) => {
                    let mut value = stored.clone();
                    value.origin = origin;
                    value
                }
                None => Self::default_value(request, origin),
            };
            debug!(device = device_name, resource = %request.operation.resource_name, "sim read");
            values.push(value);
        }
        Ok(values)
    }

    async fn handle_write_commands(
        &self,
        device_name: &str,
        protocols: &ProtocolMap,
        requests: &[CommandRequest],
        values: &[CommandValue],
    ) -> DriverResult<()> {
        if requests.len() != values.len() {
            return Err(DriverError::Permanent(
                "request/value count mismatch".into(),
            ));
        }
        let handle = self
            .handles
            .handle(&Self::handle_key(device_name, protocols), || ())
            .await;
        let _bus = handle.lock().await;

        let mut written = self.written.write().await;
        for (request, value) in requests.iter().zip(values) {
            if let Some(spec) = &request.wire {
                // Exercise the same encoder a register driver would use.
                transform::encode(value, spec)
                    .map_err(|e| DriverError::Permanent(e.to_string()))?;
            }
            written.insert(
                (
                    device_name.to_string(),
                    request.operation.resource_name.clone(),
                ),
                value.clone(),
            );
        }
        Ok(())
    }

    async fn disconnect_device(
        &self,
        device_name: &str,
        protocols: &ProtocolMap,
    ) -> DriverResult<()> {
        self.handles
            .evict(&Self::handle_key(device_name, protocols))
            .await;
        Ok(())
    }

    async fn discover(&self) -> DriverResult<()> {
        debug!("simulated driver has nothing to discover");
        Ok(())
    }

    async fn stop(&self, force: bool) -> DriverResult<()> {
        info!(force, "simulated driver stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgelink_core::models::{DeviceResource, ResourceOperation, ValueSpec};
    use edgelink_core::value::ValuePayload;

    fn request(resource: &str) -> CommandRequest {
        CommandRequest {
            operation: ResourceOperation::new(resource, 0),
            resource: DeviceResource {
                name: resource.into(),
                attributes: Default::default(),
                value: ValueSpec {
                    kind: ResourceKind::Integer,
                    precision: None,
                    writable: true,
                },
            },
            wire: None,
        }
    }

    #[tokio::test]
    async fn reads_echo_last_write() {
        let driver = SimDriver::new();
        let protocols = ProtocolMap::new();
        let requests = vec![request("Brightness")];

        let values = driver
            .handle_read_commands("Lamp", &protocols, &requests)
            .await
            .unwrap();
        assert_eq!(values[0].payload, ValuePayload::Int(0));

        let written = vec![CommandValue::new_i64("Brightness", 1, 80)];
        driver
            .handle_write_commands("Lamp", &protocols, &requests, &written)
            .await
            .unwrap();

        let values = driver
            .handle_read_commands("Lamp", &protocols, &requests)
            .await
            .unwrap();
        assert_eq!(values[0].payload, ValuePayload::Int(80));
    }

    #[test]
    fn handle_key_prefers_tcp_endpoint() {
        let mut protocols = ProtocolMap::new();
        protocols.insert(
            "ModbusTCP".into(),
            [("Host", "10.0.0.7"), ("Port", "502")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        assert_eq!(SimDriver::handle_key("D", &protocols), "10.0.0.7:502");
        assert_eq!(SimDriver::handle_key("D", &ProtocolMap::new()), "D");
    }
}
