//! Core of localdb-host: the application model and its lifecycle.
//!
//! Resources (LocalDB instances, their databases, and SQL projects) are
//! registered through [`AppBuilder`] and wired into a small event system. On
//! start each instance is provisioned through the engine backend, its
//! connection string is published to the databases under it, and once the
//! instance is healthy every database with a package gets it deployed. State
//! changes are published per resource through
//! [`ResourceNotificationService`]; failures end up there as `FailedToStart`
//! instead of being returned to the caller.

pub mod builder;
pub mod command;
pub mod deploy;
pub mod events;
pub mod health;
pub mod lifecycle;
pub mod logs;
pub mod notify;
pub mod package;
pub mod provision;
pub mod resource;
pub mod services;

pub use builder::{App, AppBuilder, DatabaseHandle, InstanceHandle, PackageBinding, ProjectHandle};
pub use command::{
    redeploy_command, CommandContext, CommandRegistry, CommandState, ExecuteCommandResult,
    IconVariant, ResourceCommand, REDEPLOY_COMMAND,
};
pub use deploy::DacpacService;
pub use events::{AppEvent, EventContext, EventKind, Eventing};
pub use health::{check_key, HealthChecks, HealthStatus};
pub use lifecycle::{validate_transition, ResourceState};
pub use logs::{LogLevel, LogLine, ResourceLogger, ResourceLoggerService};
pub use notify::{Failure, FailureKind, ResourceEvent, ResourceNotificationService, ResourceSnapshot};
pub use package::{
    parse_get_property_output, resolve_package_path, MsBuildEvaluator, ProjectEvaluator,
    SQL_TARGET_PATH, TARGET_PATH,
};
pub use provision::InstanceProvisioner;
pub use resource::{
    AppModel, ConnectionDescriptor, DatabaseResource, InstanceResource, Resource,
    ResourceWithConnectionString, SqlProjectResource,
};
pub use services::{HostSettings, Services};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] localdb_schema::ManifestError),
    #[error("runtime error: {0}")]
    Runtime(#[from] localdb_runtime::RuntimeError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unable to locate SQL Server Database project package for resource {project}")]
    PackageNotFound { project: String },
    #[error("failed to evaluate project {}: {detail}", path.display())]
    ProjectEvaluation { path: PathBuf, detail: String },
    #[error("resource '{0}' is already registered")]
    DuplicateResource(String),
    #[error("resource not found: {0}")]
    UnknownResource(String),
    #[error("resource '{name}' is not a {expected}")]
    WrongResourceKind { name: String, expected: &'static str },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("resource '{resource}' has no command '{command}'")]
    UnknownCommand { resource: String, command: String },
    #[error("command '{command}' is disabled for resource '{resource}'")]
    CommandDisabled { resource: String, command: String },
    #[error("health check '{check}' failed: {reason}")]
    Unhealthy { check: String, reason: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
