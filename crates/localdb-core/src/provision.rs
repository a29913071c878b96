use crate::lifecycle::ResourceState;
use crate::logs::ResourceLoggerService;
use crate::notify::{Failure, FailureKind, ResourceNotificationService, ResourceSnapshot};
use crate::resource::InstanceResource;
use chrono::Local;
use localdb_runtime::{EngineBackend, InstanceInfo, RuntimeError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Creates and starts LocalDB instances, reporting progress as snapshots.
pub struct InstanceProvisioner {
    engine: Arc<dyn EngineBackend>,
    logs: Arc<ResourceLoggerService>,
    notifications: Arc<ResourceNotificationService>,
}

impl InstanceProvisioner {
    pub fn new(
        engine: Arc<dyn EngineBackend>,
        logs: Arc<ResourceLoggerService>,
        notifications: Arc<ResourceNotificationService>,
    ) -> Self {
        Self {
            engine,
            logs,
            notifications,
        }
    }

    /// Get or create the instance and start it.
    ///
    /// Failures are logged against the instance and end in `FailedToStart`;
    /// the returned state is the one published last.
    pub async fn provision(
        &self,
        instance: &InstanceResource,
        cancel: &CancellationToken,
    ) -> ResourceState {
        let name = instance.name.as_str();
        let logger = self.logs.logger(name);
        logger.info(&format!("Creating LocalDb instance {name}"));
        self.publish(name, |s| {
            s.state = ResourceState::Starting;
            s.failure = None;
        });

        match self.create_and_start(instance, cancel).await {
            Ok(info) => {
                logger.info(&format!("LocalDb instance {name} is running"));
                self.publish(name, |s| {
                    s.state = ResourceState::Running;
                    s.started_at = Some(Local::now());
                    s.stopped_at = None;
                    if let Some(version) = info.version {
                        s.properties.insert("Version".to_owned(), version);
                    }
                    if let Some(pipe) = info.pipe_name {
                        s.properties.insert("PipeName".to_owned(), pipe);
                    }
                });
                ResourceState::Running
            }
            Err(e) => {
                logger.error(&format!("Failed to start LocalDb instance {name}: {e}"));
                let kind = match e {
                    RuntimeError::Cancelled => FailureKind::Cancelled,
                    _ => FailureKind::Provisioning,
                };
                self.publish(name, |s| {
                    s.state = ResourceState::FailedToStart;
                    s.failure = Some(Failure::new(kind, e.to_string()));
                });
                ResourceState::FailedToStart
            }
        }
    }

    async fn create_and_start(
        &self,
        instance: &InstanceResource,
        cancel: &CancellationToken,
    ) -> Result<InstanceInfo, RuntimeError> {
        self.engine
            .get_or_create(&instance.name, &instance.options, cancel)
            .await?;
        self.engine.start(&instance.name, cancel).await
    }

    /// Stop a running instance, deleting it when it is temporary.
    ///
    /// Instances that opted out of `stop_on_shutdown` are left running.
    pub async fn shutdown(&self, instance: &InstanceResource) -> ResourceState {
        let name = instance.name.as_str();
        let current = self.notifications.state(name).unwrap_or_default();
        let wanted = instance.options.stop_on_shutdown || instance.options.temporary;
        if current != ResourceState::Running || !wanted {
            return current;
        }

        let logger = self.logs.logger(name);
        logger.info(&format!("Stopping LocalDb instance {name}"));
        self.publish(name, |s| s.state = ResourceState::Stopping);

        let timeout = Duration::from_secs(instance.options.stop_timeout_secs);
        if let Err(e) = self.engine.stop(name, timeout).await {
            logger.warn(&format!("Failed to stop LocalDb instance {name}: {e}"));
        }
        if instance.options.temporary {
            match self.engine.delete(name).await {
                Ok(()) => logger.info(&format!("Deleted temporary LocalDb instance {name}")),
                Err(e) => logger.warn(&format!("Failed to delete LocalDb instance {name}: {e}")),
            }
        }

        self.publish(name, |s| {
            s.state = ResourceState::Stopped;
            s.stopped_at = Some(Local::now());
        });
        ResourceState::Stopped
    }

    fn publish(&self, name: &str, update: impl FnOnce(&mut ResourceSnapshot)) {
        if let Err(e) = self.notifications.publish_update(name, update) {
            warn!(resource = name, "dropping snapshot update: {e}");
        }
    }
}
