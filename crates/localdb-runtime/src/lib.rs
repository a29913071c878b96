//! External collaborators of localdb-host.
//!
//! This crate wraps the two services the host never implements itself: the
//! LocalDB engine that creates and starts named SQL Server instances
//! (`EngineBackend`, driven through the `sqllocaldb` tool) and the schema
//! deployer that publishes compiled `.dacpac` packages (`DeployBackend`, driven
//! through `sqlpackage`). Mock backends and prerequisite checks live here too.

pub mod deployer;
pub mod engine;
pub mod mock;
pub mod prereq;
mod process;
pub mod sqllocaldb;
pub mod sqlpackage;

pub use deployer::{select_deployer, DeployBackend, DeployRequest, MessageSink};
pub use engine::{select_engine, EngineBackend, InstanceInfo};
pub use mock::{MockDeployer, MockEngine};
pub use prereq::{
    check_deployer_prereqs, check_engine_prereqs, check_project_prereqs, format_missing,
    MissingPrereq,
};
pub use sqllocaldb::SqlLocalDbCli;
pub use sqlpackage::SqlPackageCli;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("LocalDB instance '{0}' does not exist")]
    InstanceNotFound(String),
    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("unexpected output from {program}: {detail}")]
    InvalidOutput { program: String, detail: String },
    #[error("deployment failed: {0}")]
    DeployFailed(String),
    #[error("operation cancelled")]
    Cancelled,
}
