use crate::options::{DeployOptions, InstanceOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },
    #[error("resource name '{0}' is declared more than once")]
    DuplicateResource(String),
    #[error("database '{database}' references unknown instance '{instance}'")]
    UnknownInstance { database: String, instance: String },
    #[error("project '{project}' targets unknown database '{database}'")]
    UnknownDatabase { project: String, database: String },
    #[error("database '{0}' has more than one package source")]
    DuplicatePackage(String),
    #[error("{section}.backend must not be empty")]
    EmptyBackend { section: &'static str },
}

/// Version 1 of the application manifest (`localdb.toml`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManifestV1 {
    pub manifest_version: u32,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub deployer: DeployerSection,
    #[serde(default)]
    pub instance: BTreeMap<String, InstanceOptions>,
    #[serde(default)]
    pub database: BTreeMap<String, DatabaseSection>,
    #[serde(default)]
    pub project: BTreeMap<String, ProjectSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_engine_backend")]
    pub backend: String,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            backend: default_engine_backend(),
            health_timeout_secs: default_health_timeout_secs(),
            health_interval_ms: default_health_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeployerSection {
    #[serde(default = "default_deployer_backend")]
    pub backend: String,
    /// Override for the deployer executable, e.g. a full path to `sqlpackage`.
    #[serde(default)]
    pub executable: Option<String>,
}

impl Default for DeployerSection {
    fn default() -> Self {
        Self {
            backend: default_deployer_backend(),
            executable: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    pub instance: String,
    /// Name of the database inside the instance. Defaults to the table key.
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub dacpac: Option<PathBuf>,
    #[serde(default)]
    pub deploy: DeployOptions,
}

/// A SQL Server database project whose compiled package is pushed to `target`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    /// Project file (`.sqlproj`) evaluated for its output path.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Known package location, used when the project file yields nothing.
    #[serde(default)]
    pub dacpac: Option<PathBuf>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub deploy: DeployOptions,
}

impl DatabaseSection {
    pub fn database_name_or<'a>(&'a self, key: &'a str) -> &'a str {
        self.database_name.as_deref().unwrap_or(key)
    }
}

fn default_engine_backend() -> String {
    "sqllocaldb".to_owned()
}

fn default_deployer_backend() -> String {
    "sqlpackage".to_owned()
}

fn default_health_timeout_secs() -> u64 {
    60
}

fn default_health_interval_ms() -> u64 {
    500
}

pub fn parse_manifest_str(input: &str) -> Result<ManifestV1, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ManifestV1, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_manifest() {
        let input = r#"
manifest_version = 1

[engine]
backend = "mock"
health_timeout_secs = 5

[deployer]
backend = "sqlpackage"
executable = "/opt/sqlpackage/sqlpackage"

[instance.TestDb]
version = "15.0"
temporary = true

[database.Database]
instance = "TestDb"
database_name = "Database1"

[database.Database.deploy]
drop_objects_not_in_source = true
properties = { IgnorePermissions = "True" }

[project.Database1]
path = "Database1/Database1.sqlproj"
target = "Database"
"#;
        let manifest = parse_manifest_str(input).expect("should parse");
        assert_eq!(manifest.manifest_version, 1);
        assert_eq!(manifest.engine.backend, "mock");
        assert_eq!(manifest.engine.health_timeout_secs, 5);
        assert_eq!(manifest.engine.health_interval_ms, 500);
        assert_eq!(
            manifest.deployer.executable.as_deref(),
            Some("/opt/sqlpackage/sqlpackage")
        );

        let instance = &manifest.instance["TestDb"];
        assert_eq!(instance.version.as_deref(), Some("15.0"));
        assert!(instance.temporary);
        assert!(instance.stop_on_shutdown);

        let db = &manifest.database["Database"];
        assert_eq!(db.instance, "TestDb");
        assert_eq!(db.database_name_or("Database"), "Database1");
        assert!(db.deploy.drop_objects_not_in_source);
        assert_eq!(db.deploy.properties["IgnorePermissions"], "True");

        let project = &manifest.project["Database1"];
        assert_eq!(project.target.as_deref(), Some("Database"));
        assert!(project.dacpac.is_none());
    }

    #[test]
    fn parses_minimal_manifest() {
        let manifest = parse_manifest_str("manifest_version = 1\n").expect("should parse");
        assert_eq!(manifest.engine.backend, "sqllocaldb");
        assert_eq!(manifest.deployer.backend, "sqlpackage");
        assert!(manifest.instance.is_empty());
        assert!(manifest.database.is_empty());
    }

    #[test]
    fn database_name_defaults_to_key() {
        let manifest = parse_manifest_str(
            r#"
manifest_version = 1
[instance.Local]
[database.Orders]
instance = "Local"
"#,
        )
        .unwrap();
        assert_eq!(manifest.database["Orders"].database_name_or("Orders"), "Orders");
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
manifest_version = 1

[instance.TestDb]
colour = "blue"
"#;
        assert!(parse_manifest_str(input).is_err());
    }

    #[test]
    fn rejects_database_without_instance() {
        let input = r"
manifest_version = 1

[database.Orders]
";
        assert!(parse_manifest_str(input).is_err());
    }

    #[test]
    fn reads_manifest_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("localdb.toml");
        fs::write(&path, "manifest_version = 1\n[instance.A]\n").unwrap();
        let manifest = parse_manifest_file(&path).unwrap();
        assert!(manifest.instance.contains_key("A"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_manifest_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ManifestError::Io(_)));
    }
}
