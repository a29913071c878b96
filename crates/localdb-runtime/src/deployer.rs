use crate::RuntimeError;
use async_trait::async_trait;
use localdb_schema::DeployOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Receives progress messages emitted by the deployer while it runs.
pub type MessageSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployRequest {
    pub package_path: PathBuf,
    pub connection_string: String,
    pub database_name: String,
    /// Upgrade an existing database in place instead of recreating it.
    pub upgrade_existing: bool,
    pub options: DeployOptions,
}

/// A schema deployer that publishes a compiled package into a database.
#[async_trait]
pub trait DeployBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    async fn deploy(
        &self,
        request: &DeployRequest,
        cancel: &CancellationToken,
        on_message: MessageSink<'_>,
    ) -> Result<(), RuntimeError>;
}

pub fn select_deployer(
    name: &str,
    executable: Option<&str>,
) -> Result<Box<dyn DeployBackend>, RuntimeError> {
    match name {
        "sqlpackage" => Ok(Box::new(match executable {
            Some(program) => crate::sqlpackage::SqlPackageCli::with_program(program),
            None => crate::sqlpackage::SqlPackageCli::new(),
        })),
        "mock" => Ok(Box::new(crate::mock::MockDeployer::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
