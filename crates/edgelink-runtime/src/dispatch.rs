//! Command dispatcher.
//!
//! Translates a named Get/Set command on a device into driver calls:
//! gate checks, command expansion, parameter typing, per-device
//! serialization, bounded retries, operating-state transitions, wire
//! transformation, and event emission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use edgelink_clients::CoreClients;
use edgelink_core::models::{Device, Event, OperatingState, Reading, ResourceOperation};
use edgelink_core::value::CommandValue;
use edgelink_core::{SvcError, SvcResult};

use crate::cache::{Cache, CachedProfile};
use crate::driver::{CommandRequest, DriverError, ProtocolDriver};
use crate::transform;

/// Attempts per driver call, including the first.
const DRIVER_ATTEMPTS: u32 = 3;

/// Per-call driver timeout; matches the transaction timeout of the
/// Modbus-class transports.
const DRIVER_CALL_TIMEOUT: Duration = Duration::from_millis(2000);

/// Direction of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMethod {
    Get,
    Set,
}

/// Translates named commands into serialized, retried driver calls.
pub struct CommandDispatcher {
    cache: Arc<Cache>,
    driver: Arc<dyn ProtocolDriver>,
    clients: CoreClients,
    /// Per-device serialization tokens, created on first use and evicted
    /// via [`Self::forget_device`] when a callback removes the device. An
    /// in-flight command holds the token through its own `Arc`, so
    /// eviction never yanks it mid-transaction.
    device_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    driver_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(cache: Arc<Cache>, driver: Arc<dyn ProtocolDriver>, clients: CoreClients) -> Self {
        Self {
            cache,
            driver,
            clients,
            device_locks: Mutex::new(HashMap::new()),
            driver_timeout: DRIVER_CALL_TIMEOUT,
        }
    }

    /// Override the per-call driver timeout.
    pub fn with_driver_timeout(mut self, timeout: Duration) -> Self {
        self.driver_timeout = timeout;
        self
    }

    /// REST entry point: execute and forward the resulting event to Core
    /// Data, best-effort.
    pub async fn handle_command(
        &self,
        device_name: &str,
        command: &str,
        method: CommandMethod,
        params: &HashMap<String, String>,
        correlation: &str,
    ) -> SvcResult<Event> {
        let event = self
            .execute(device_name, command, method, params, correlation)
            .await?;
        self.post_event(event.clone(), correlation);
        Ok(event)
    }

    /// Forward an event to Core Data without blocking the caller.
    pub fn post_event(&self, event: Event, correlation: &str) {
        let client = self.clients.event.clone();
        let correlation = correlation.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.add(&event, &correlation).await {
                warn!(device = %event.device, "failed to push event to core data: {}", e);
            }
        });
    }

    /// Run the full dispatch pipeline and return the resulting event.
    /// Emission is the caller's choice; the autoevent scheduler filters
    /// on-change readings before forwarding.
    pub async fn execute(
        &self,
        device_name: &str,
        command: &str,
        method: CommandMethod,
        params: &HashMap<String, String>,
        correlation: &str,
    ) -> SvcResult<Event> {
        let device = self
            .cache
            .devices
            .for_name(device_name)
            .await
            .ok_or_else(|| SvcError::not_found(format!("device {}", device_name)))?;
        let profile = self
            .cache
            .profiles
            .for_name(&device.profile_name)
            .await
            .ok_or_else(|| {
                SvcError::not_found(format!(
                    "profile {} for device {}",
                    device.profile_name, device_name
                ))
            })?;

        if device.is_locked() {
            return Err(SvcError::locked(device_name.to_string()));
        }
        if method == CommandMethod::Set && device.operating_state == OperatingState::Disabled {
            return Err(SvcError::conflict(format!(
                "device {} is operating-disabled",
                device_name
            )));
        }

        let operations = expand(&profile, command)?;
        let requests = build_requests(&profile, &operations)?;

        let origin = now_ms();
        let values = match method {
            CommandMethod::Get => Vec::new(),
            CommandMethod::Set => parse_params(&requests, params, origin)?,
        };

        // One concurrent driver call per physical device.
        let token = self.device_lock(device_name).await;
        let _serialized = token.lock().await;

        let result = self.call_driver(&device, method, &requests, &values).await;

        match &result {
            Ok(_) => self.transition_on_success(device_name, correlation).await,
            Err(e) if e.is_timeout() => self.transition_on_timeout(device_name, correlation).await,
            Err(_) => {}
        }
        let raw = result.map_err(SvcError::from)?;

        let readings = match method {
            CommandMethod::Get => {
                if raw.len() != requests.len() {
                    return Err(SvcError::server(format!(
                        "driver answered {} values for {} requests",
                        raw.len(),
                        requests.len()
                    )));
                }
                raw.into_iter()
                    .zip(&requests)
                    .map(|(value, request)| {
                        transform::decode(value, &request.resource).map(reading_from)
                    })
                    .collect::<SvcResult<Vec<_>>>()?
            }
            CommandMethod::Set => values.iter().cloned().map(reading_from).collect(),
        };

        debug!(
            device = device_name,
            command,
            readings = readings.len(),
            "command dispatched"
        );
        Ok(Event {
            device: device.name,
            origin: now_ms(),
            readings,
        })
    }

    async fn call_driver(
        &self,
        device: &Device,
        method: CommandMethod,
        requests: &[CommandRequest],
        values: &[CommandValue],
    ) -> Result<Vec<CommandValue>, DriverError> {
        let mut last_err = None;
        for attempt in 1..=DRIVER_ATTEMPTS {
            let call = async {
                match method {
                    CommandMethod::Get => {
                        self.driver
                            .handle_read_commands(&device.name, &device.protocols, requests)
                            .await
                    }
                    CommandMethod::Set => self
                        .driver
                        .handle_write_commands(&device.name, &device.protocols, requests, values)
                        .await
                        .map(|_| Vec::new()),
                }
            };
            match tokio::time::timeout(self.driver_timeout, call).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(device = %device.name, attempt, "retryable driver failure: {}", e);
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!(device = %device.name, attempt, "driver call timed out");
                    last_err = Some(DriverError::Timeout(format!(
                        "driver call exceeded {}ms",
                        self.driver_timeout.as_millis()
                    )));
                }
            }
        }
        Err(last_err.expect("at least one attempt ran"))
    }

    /// `Enabled -> Disabled` on a timeout-class failure, persisted to Core
    /// fire-and-forget.
    async fn transition_on_timeout(&self, device_name: &str, correlation: &str) {
        self.transition(device_name, OperatingState::Disabled, correlation)
            .await;
    }

    /// `Disabled -> Enabled` on any success, persisted likewise.
    async fn transition_on_success(&self, device_name: &str, correlation: &str) {
        self.transition(device_name, OperatingState::Enabled, correlation)
            .await;
    }

    async fn transition(&self, device_name: &str, target: OperatingState, correlation: &str) {
        let Some(device) = self.cache.devices.for_name(device_name).await else {
            return;
        };
        if device.operating_state == target {
            return;
        }
        if let Err(e) = self
            .cache
            .devices
            .set_operating_state(device_name, target)
            .await
        {
            warn!(device = device_name, "operating state write failed: {}", e);
            return;
        }
        info!(device = device_name, state = %target, "operating state changed");

        let client = self.clients.device.clone();
        let name = device_name.to_string();
        let correlation = correlation.to_string();
        tokio::spawn(async move {
            if let Err(e) = client
                .update_op_state_by_name(&name, target, &correlation)
                .await
            {
                warn!(device = %name, "could not persist operating state: {}", e);
            }
        });
    }

    async fn device_lock(&self, device_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.device_locks.lock().await;
        locks
            .entry(device_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the serialization token of a removed device so the lock map
    /// does not grow with every device that ever existed. A command still
    /// holding the old token keeps it alive until it completes.
    pub async fn forget_device(&self, device_name: &str) {
        self.device_locks.lock().await.remove(device_name);
    }

    /// Devices currently holding a serialization token entry.
    pub async fn tracked_device_count(&self) -> usize {
        self.device_locks.lock().await.len()
    }
}

/// Resolve a command name against the profile: device command first, bare
/// resource second.
fn expand(profile: &CachedProfile, command: &str) -> SvcResult<Vec<ResourceOperation>> {
    if let Some(operations) = profile.resource_ops.get(command) {
        return Ok(operations.clone());
    }
    if profile.profile.device_resources.contains_key(command) {
        return Ok(vec![ResourceOperation::new(command, 0)]);
    }
    Err(SvcError::not_found(format!(
        "command {} not defined by profile {}",
        command, profile.profile.name
    )))
}

fn build_requests(
    profile: &CachedProfile,
    operations: &[ResourceOperation],
) -> SvcResult<Vec<CommandRequest>> {
    operations
        .iter()
        .map(|operation| {
            let resource = profile
                .profile
                .device_resources
                .get(&operation.resource_name)
                .cloned()
                .ok_or_else(|| {
                    SvcError::server(format!(
                        "profile {} lost resource {}",
                        profile.profile.name, operation.resource_name
                    ))
                })?;
            let wire = profile.wire_specs.get(&operation.resource_name).cloned();
            Ok(CommandRequest {
                operation: operation.clone(),
                resource,
                wire,
            })
        })
        .collect()
}

/// Type every write parameter; unknown keys are ignored, missing keys are
/// a bad request and the driver is never called.
fn parse_params(
    requests: &[CommandRequest],
    params: &HashMap<String, String>,
    origin: i64,
) -> SvcResult<Vec<CommandValue>> {
    requests
        .iter()
        .map(|request| {
            let name = &request.operation.resource_name;
            let raw = params.get(name).ok_or_else(|| {
                SvcError::bad_request(format!("missing parameter for resource {}", name))
            })?;
            let value = CommandValue::parse(name.clone(), origin, request.resource.value.kind, raw)?;
            if let Some(spec) = &request.wire {
                // Surface unencodable payloads (bad hex, oversize strings)
                // before any bus traffic happens.
                transform::encode(&value, spec)?;
            }
            Ok(value)
        })
        .collect()
}

fn reading_from(value: CommandValue) -> Reading {
    Reading {
        name: value.resource.clone(),
        value: value.value_string(),
        origin: value.origin,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
