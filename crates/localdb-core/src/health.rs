use crate::notify::ResourceNotificationService;
use crate::resource::{InstanceResource, ResourceWithConnectionString};
use crate::CoreError;
use localdb_runtime::EngineBackend;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Key under which the health check of `instance` is registered.
pub fn check_key(instance: &str) -> String {
    format!("{instance}_check")
}

/// Health checks for LocalDB instances.
pub struct HealthChecks {
    engine: Arc<dyn EngineBackend>,
    notifications: Arc<ResourceNotificationService>,
    checks: Mutex<BTreeMap<String, InstanceResource>>,
}

impl HealthChecks {
    pub fn new(
        engine: Arc<dyn EngineBackend>,
        notifications: Arc<ResourceNotificationService>,
    ) -> Self {
        Self {
            engine,
            notifications,
            checks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register the check for `instance`, returning its key.
    pub fn register(&self, instance: &InstanceResource) -> String {
        let key = check_key(&instance.name);
        if let Ok(mut checks) = self.checks.lock() {
            checks.insert(key.clone(), instance.clone());
        }
        key
    }

    pub fn keys(&self) -> Vec<String> {
        self.checks
            .lock()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Run the check once.
    pub async fn check(&self, key: &str) -> Result<HealthStatus, CoreError> {
        let instance = self
            .checks
            .lock()
            .ok()
            .and_then(|c| c.get(key).cloned())
            .ok_or_else(|| CoreError::UnknownResource(key.to_owned()))?;

        if instance.connection_string(&self.notifications).is_none() {
            return Ok(HealthStatus::Unhealthy(
                "Connection string is unavailable".to_owned(),
            ));
        }
        Ok(match self.engine.info(&instance.name).await {
            Ok(info) if info.running => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Unhealthy(format!(
                "LocalDb instance {} is not running",
                instance.name
            )),
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    /// Poll the check every `interval` until it is healthy.
    pub async fn wait_healthy(
        &self,
        key: &str,
        interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        // `None` when the timeout reaches past what `Instant` can hold.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let reason = match self.check(key).await? {
                HealthStatus::Healthy => return Ok(()),
                HealthStatus::Unhealthy(reason) => reason,
            };
            debug!(check = key, "unhealthy: {reason}");
            let out_of_time = match (deadline, Instant::now().checked_add(interval)) {
                (Some(deadline), Some(next)) => next > deadline,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if out_of_time {
                return Err(CoreError::Unhealthy {
                    check: key.to_owned(),
                    reason,
                });
            }
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = cancel.cancelled() => return Err(CoreError::Cancelled),
            }
        }
    }
}
