use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a LocalDB instance is created and torn down.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InstanceOptions {
    /// LocalDB engine version used when the instance has to be created.
    #[serde(default)]
    pub version: Option<String>,
    /// Delete the instance (and its files) when the application shuts down.
    #[serde(default)]
    pub temporary: bool,
    #[serde(default = "default_true")]
    pub stop_on_shutdown: bool,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            version: None,
            temporary: false,
            stop_on_shutdown: true,
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

/// Options forwarded to the schema deployer.
///
/// The deployment always upgrades an existing database in place; these only
/// tune how the upgrade treats drift between the package and the target.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeployOptions {
    #[serde(default = "default_true")]
    pub block_on_possible_data_loss: bool,
    #[serde(default)]
    pub drop_objects_not_in_source: bool,
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    /// Additional deployer properties, passed through verbatim.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            block_on_possible_data_loss: true,
            drop_objects_not_in_source: false,
            command_timeout_secs: None,
            properties: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_stop_timeout_secs() -> u64 {
    30
}
