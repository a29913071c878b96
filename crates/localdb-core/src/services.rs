use crate::deploy::DacpacService;
use crate::events::Eventing;
use crate::health::HealthChecks;
use crate::logs::ResourceLoggerService;
use crate::notify::ResourceNotificationService;
use crate::provision::InstanceProvisioner;
use crate::CoreError;
use localdb_runtime::{select_deployer, select_engine, DeployBackend, EngineBackend};
use localdb_schema::ManifestV1;
use std::sync::Arc;
use std::time::Duration;

/// Host-wide timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSettings {
    pub health_timeout: Duration,
    pub health_interval: Duration,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            health_timeout: Duration::from_secs(60),
            health_interval: Duration::from_millis(500),
        }
    }
}

/// Shared services handed to every event handler and command.
pub struct Services {
    pub engine: Arc<dyn EngineBackend>,
    pub deployer: Arc<dyn DeployBackend>,
    pub notifications: Arc<ResourceNotificationService>,
    pub logs: Arc<ResourceLoggerService>,
    pub eventing: Eventing,
    pub health: HealthChecks,
    pub provisioner: InstanceProvisioner,
    pub dacpac: DacpacService,
    pub settings: HostSettings,
}

impl Services {
    pub fn new(engine: Arc<dyn EngineBackend>, deployer: Arc<dyn DeployBackend>) -> Self {
        Self::with_settings(engine, deployer, HostSettings::default())
    }

    pub fn with_settings(
        engine: Arc<dyn EngineBackend>,
        deployer: Arc<dyn DeployBackend>,
        settings: HostSettings,
    ) -> Self {
        let notifications = Arc::new(ResourceNotificationService::new());
        let logs = Arc::new(ResourceLoggerService::new());
        Self {
            health: HealthChecks::new(Arc::clone(&engine), Arc::clone(&notifications)),
            provisioner: InstanceProvisioner::new(
                Arc::clone(&engine),
                Arc::clone(&logs),
                Arc::clone(&notifications),
            ),
            dacpac: DacpacService::new(
                Arc::clone(&deployer),
                Arc::clone(&logs),
                Arc::clone(&notifications),
            ),
            eventing: Eventing::new(),
            engine,
            deployer,
            notifications,
            logs,
            settings,
        }
    }

    /// Build the services from the backends named in the manifest.
    pub fn from_manifest(manifest: &ManifestV1) -> Result<Self, CoreError> {
        let engine: Arc<dyn EngineBackend> = select_engine(&manifest.engine.backend)?.into();
        let deployer: Arc<dyn DeployBackend> = select_deployer(
            &manifest.deployer.backend,
            manifest.deployer.executable.as_deref(),
        )?
        .into();
        let settings = HostSettings {
            health_timeout: Duration::from_secs(manifest.engine.health_timeout_secs),
            health_interval: Duration::from_millis(manifest.engine.health_interval_ms),
        };
        Ok(Self::with_settings(engine, deployer, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use localdb_schema::parse_manifest_str;

    #[test]
    fn from_manifest_selects_backends_and_timings() {
        let manifest = parse_manifest_str(
            r#"
manifest_version = 1

[engine]
backend = "mock"
health_timeout_secs = 5
health_interval_ms = 20

[deployer]
backend = "mock"
"#,
        )
        .unwrap();
        let services = Services::from_manifest(&manifest).unwrap();
        assert_eq!(services.engine.name(), "mock");
        assert_eq!(services.deployer.name(), "mock");
        assert_eq!(services.settings.health_timeout, Duration::from_secs(5));
        assert_eq!(services.settings.health_interval, Duration::from_millis(20));
    }

    #[test]
    fn unknown_backend_is_a_runtime_error() {
        let manifest = parse_manifest_str(
            r#"
manifest_version = 1

[engine]
backend = "docker"
"#,
        )
        .unwrap();
        assert!(matches!(
            Services::from_manifest(&manifest),
            Err(CoreError::Runtime(_))
        ));
    }
}
