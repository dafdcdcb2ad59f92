//! Callback reconciler.
//!
//! Applies Core catalog changes into the cache and keeps the scheduler in
//! step. Fetch failures are the caller's fault (they sent an id we cannot
//! resolve) and answer `BadRequest`; cache mutation failures are ours and
//! answer `ServerError`. Nothing in here panics the process.

use std::sync::Arc;

use tracing::{debug, info, warn};

use edgelink_clients::CoreClients;
use edgelink_core::models::{CallbackAction, CallbackAlert, Device};
use edgelink_core::{SvcError, SvcResult};

use crate::autoevent::AutoEventManager;
use crate::cache::Cache;
use crate::dispatch::CommandDispatcher;
use crate::driver::ProtocolDriver;
use crate::provision;

/// HTTP method the callback arrived with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackMethod {
    Post,
    Put,
    Delete,
}

/// Applies `(actionType, method, id)` tuples into the cache.
pub struct CallbackReconciler {
    cache: Arc<Cache>,
    clients: CoreClients,
    scheduler: Arc<AutoEventManager>,
    dispatcher: Arc<CommandDispatcher>,
    driver: Arc<dyn ProtocolDriver>,
}

impl CallbackReconciler {
    pub fn new(
        cache: Arc<Cache>,
        clients: CoreClients,
        scheduler: Arc<AutoEventManager>,
        dispatcher: Arc<CommandDispatcher>,
        driver: Arc<dyn ProtocolDriver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            clients,
            scheduler,
            dispatcher,
            driver,
        })
    }

    /// Entry point for the `/callback` surface.
    pub async fn handle(
        &self,
        alert: &CallbackAlert,
        method: CallbackMethod,
        correlation: &str,
    ) -> SvcResult<()> {
        if alert.id.is_empty() {
            return Err(SvcError::bad_request("missing callback id"));
        }
        match alert.action_type {
            CallbackAction::Device => self.handle_device(method, &alert.id, correlation).await,
            CallbackAction::Profile => self.handle_profile(method, &alert.id, correlation).await,
            CallbackAction::Unknown => {
                Err(SvcError::bad_request("invalid callback action type"))
            }
        }
    }

    async fn handle_device(
        &self,
        method: CallbackMethod,
        id: &str,
        correlation: &str,
    ) -> SvcResult<()> {
        match method {
            CallbackMethod::Post => {
                let device = self.fetch_device(id, correlation).await?;
                self.ensure_profile(&device, correlation).await?;
                self.cache.devices.add(device.clone()).await.map_err(|e| {
                    warn!(device = %device.name, "could not add device: {}", e);
                    SvcError::server(e.to_string())
                })?;
                info!(device = %device.name, "device added");
                self.scheduler.restart_for_device(&device.name).await;
                Ok(())
            }
            CallbackMethod::Put => {
                let device = self.fetch_device(id, correlation).await?;
                self.ensure_profile(&device, correlation).await?;
                // A PUT may arrive for a device we never saw (service was
                // down during the POST); treat it as an install.
                let result = match self.cache.devices.update(device.clone()).await {
                    Err(SvcError::NotFound(_)) => self.cache.devices.add(device.clone()).await,
                    other => other,
                };
                result.map_err(|e| {
                    warn!(device = %device.name, "could not update device: {}", e);
                    SvcError::server(e.to_string())
                })?;
                info!(device = %device.name, "device updated");
                self.scheduler.restart_for_device(&device.name).await;
                Ok(())
            }
            CallbackMethod::Delete => {
                let Some(device) = self.cache.devices.for_id(id).await else {
                    // Unknown id: cache and scheduler stay untouched.
                    return Err(SvcError::bad_request(format!(
                        "cannot remove unknown device {}",
                        id
                    )));
                };
                self.scheduler.stop_for_device(&device.name).await;
                self.cache.devices.remove(id).await.map_err(|e| {
                    warn!(device = %device.name, "could not remove device: {}", e);
                    SvcError::server(e.to_string())
                })?;
                self.dispatcher.forget_device(&device.name).await;
                info!(device = %device.name, "device removed");

                // Let the driver tear down its transport state.
                let driver = self.driver.clone();
                tokio::spawn(async move {
                    if let Err(e) = driver
                        .disconnect_device(&device.name, &device.protocols)
                        .await
                    {
                        warn!(device = %device.name, "driver disconnect reported: {}", e);
                    }
                });
                Ok(())
            }
        }
    }

    async fn handle_profile(
        &self,
        method: CallbackMethod,
        id: &str,
        correlation: &str,
    ) -> SvcResult<()> {
        if method != CallbackMethod::Put {
            return Err(SvcError::bad_request("invalid device profile method"));
        }
        let profile = self
            .clients
            .profile
            .profile(id, correlation)
            .await
            .map_err(|e| {
                warn!(profile = id, "cannot fetch profile from core metadata: {}", e);
                SvcError::bad_request(e.to_string())
            })?;
        let name = profile.name.clone();
        self.cache.profiles.update(profile).await.map_err(|e| {
            warn!(profile = %name, "could not update profile: {}", e);
            SvcError::server(e.to_string())
        })?;
        // Visible to the next dispatch; running schedules are untouched.
        info!(profile = %name, "profile updated");
        Ok(())
    }

    async fn fetch_device(&self, id: &str, correlation: &str) -> SvcResult<Device> {
        self.clients.device.device(id, correlation).await.map_err(|e| {
            warn!(device = id, "cannot fetch device from core metadata: {}", e);
            SvcError::bad_request(e.to_string())
        })
    }

    /// Fetch and install the device's profile when the cache lacks it.
    /// An already-present profile is never re-added.
    async fn ensure_profile(&self, device: &Device, correlation: &str) -> SvcResult<()> {
        if self.cache.profiles.contains(&device.profile_name).await {
            debug!(profile = %device.profile_name, "profile already cached");
            return Ok(());
        }
        let profile = self
            .clients
            .profile
            .profile_for_name(&device.profile_name, correlation)
            .await
            .map_err(|e| {
                warn!(profile = %device.profile_name,
                      "cannot fetch profile from core metadata: {}", e);
                SvcError::bad_request(e.to_string())
            })?;
        self.cache.profiles.add(profile.clone()).await.map_err(|e| {
            warn!(profile = %device.profile_name, "could not add profile: {}", e);
            SvcError::server(e.to_string())
        })?;
        info!(profile = %device.profile_name, "profile added");
        provision::push_value_descriptors(&self.clients, &profile);
        Ok(())
    }
}
