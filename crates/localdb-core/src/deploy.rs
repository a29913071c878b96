use crate::lifecycle::ResourceState;
use crate::logs::ResourceLoggerService;
use crate::notify::{Failure, FailureKind, ResourceNotificationService, ResourceSnapshot};
use crate::resource::{DatabaseResource, ResourceWithConnectionString};
use chrono::Local;
use localdb_runtime::{DeployBackend, DeployRequest, RuntimeError};
use localdb_schema::DeployOptions;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Publishes `.dacpac` packages into LocalDB databases.
pub struct DacpacService {
    deployer: Arc<dyn DeployBackend>,
    logs: Arc<ResourceLoggerService>,
    notifications: Arc<ResourceNotificationService>,
}

impl DacpacService {
    pub fn new(
        deployer: Arc<dyn DeployBackend>,
        logs: Arc<ResourceLoggerService>,
        notifications: Arc<ResourceNotificationService>,
    ) -> Self {
        Self {
            deployer,
            logs,
            notifications,
        }
    }

    /// Deploy `package_path` into `database`, upgrading it in place.
    ///
    /// The outcome is published on the database snapshot and returned; a
    /// failed deployment is never an error for the caller.
    pub async fn deploy(
        &self,
        package_path: &Path,
        database: &DatabaseResource,
        options: &DeployOptions,
        cancel: &CancellationToken,
    ) -> ResourceState {
        let name = database.name.as_str();
        let logger = self.logs.logger(name);
        self.publish(name, |s| {
            s.state = ResourceState::Starting;
            s.failure = None;
        });
        logger.info(&format!(
            "Deploying dacpac from {} to {}",
            package_path.display(),
            database.database_name
        ));

        let on_message = |line: &str| logger.info(line);
        let result = match self.request(package_path, database, options) {
            Ok(request) => self
                .deployer
                .deploy(&request, cancel, &on_message)
                .await
                .map_err(|e| match e {
                    RuntimeError::Cancelled => {
                        Failure::new(FailureKind::Cancelled, "deployment cancelled")
                    }
                    other => Failure::new(FailureKind::Deployment, other.to_string()),
                }),
            Err(failure) => Err(failure),
        };

        match result {
            Ok(()) => {
                logger.info(&format!(
                    "Deployed dacpac to {}",
                    database.database_name
                ));
                self.publish(name, |s| {
                    s.state = ResourceState::Running;
                    s.started_at = Some(Local::now());
                });
                ResourceState::Running
            }
            Err(failure) => {
                logger.error(&format!("Failed to deploy dacpac: {}", failure.message));
                self.publish(name, |s| {
                    s.state = ResourceState::FailedToStart;
                    s.failure = Some(failure);
                });
                ResourceState::FailedToStart
            }
        }
    }

    fn request(
        &self,
        package_path: &Path,
        database: &DatabaseResource,
        options: &DeployOptions,
    ) -> Result<DeployRequest, Failure> {
        if !package_path.is_file() {
            return Err(Failure::new(
                FailureKind::PackageNotFound,
                format!("package {} does not exist", package_path.display()),
            ));
        }
        let connection_string = database
            .connection_string(&self.notifications)
            .ok_or_else(|| {
                Failure::new(
                    FailureKind::Configuration,
                    format!(
                        "connection string for database {} is not available; instance {} has not started",
                        database.name, database.parent
                    ),
                )
            })?;

        Ok(DeployRequest {
            package_path: package_path.to_path_buf(),
            connection_string,
            database_name: database.database_name.clone(),
            upgrade_existing: true,
            options: options.clone(),
        })
    }

    fn publish(&self, name: &str, update: impl FnOnce(&mut ResourceSnapshot)) {
        if let Err(e) = self.notifications.publish_update(name, update) {
            warn!(resource = name, "dropping snapshot update: {e}");
        }
    }
}
