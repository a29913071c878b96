use crate::RuntimeError;
use async_trait::async_trait;
use localdb_schema::InstanceOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the engine reports about a named instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceInfo {
    pub name: String,
    pub exists: bool,
    pub running: bool,
    pub version: Option<String>,
    /// Named pipe the running instance listens on, e.g. `np:\\.\pipe\LOCALDB#1A2B\tsql\query`.
    pub pipe_name: Option<String>,
}

impl InstanceInfo {
    pub fn missing(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }
}

/// A LocalDB engine able to manage named instances.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    async fn info(&self, instance: &str) -> Result<InstanceInfo, RuntimeError>;

    /// Return the named instance, creating it first when it does not exist.
    async fn get_or_create(
        &self,
        instance: &str,
        options: &InstanceOptions,
        cancel: &CancellationToken,
    ) -> Result<InstanceInfo, RuntimeError>;

    /// Start the instance. Starting an already running instance succeeds.
    async fn start(
        &self,
        instance: &str,
        cancel: &CancellationToken,
    ) -> Result<InstanceInfo, RuntimeError>;

    /// Stop the instance, killing it when it does not shut down within `timeout`.
    async fn stop(&self, instance: &str, timeout: Duration) -> Result<(), RuntimeError>;

    async fn delete(&self, instance: &str) -> Result<(), RuntimeError>;
}

pub fn select_engine(name: &str) -> Result<Box<dyn EngineBackend>, RuntimeError> {
    match name {
        "sqllocaldb" => Ok(Box::new(crate::sqllocaldb::SqlLocalDbCli::new())),
        "mock" => Ok(Box::new(crate::mock::MockEngine::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_engines() {
        assert_eq!(select_engine("sqllocaldb").unwrap().name(), "sqllocaldb");
        assert_eq!(select_engine("mock").unwrap().name(), "mock");
    }

    #[test]
    fn select_invalid_engine_fails() {
        assert!(matches!(
            select_engine("docker"),
            Err(RuntimeError::BackendUnavailable(name)) if name == "docker"
        ));
    }

    #[test]
    fn missing_info_is_stopped() {
        let info = InstanceInfo::missing("TestDb");
        assert_eq!(info.name, "TestDb");
        assert!(!info.exists);
        assert!(!info.running);
    }
}
