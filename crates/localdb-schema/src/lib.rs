//! Application manifest for localdb-host.
//!
//! Parses the TOML description of LocalDB instances, their databases, and the
//! SQL projects whose packages are deployed into them (`ManifestV1`), validates
//! names and cross references, and defines the option types shared with the
//! runtime backends.

pub mod manifest;
pub mod options;
pub mod validate;

pub use manifest::{
    parse_manifest_file, parse_manifest_str, DatabaseSection, DeployerSection, EngineSection,
    ManifestError, ManifestV1, ProjectSection,
};
pub use options::{DeployOptions, InstanceOptions};
pub use validate::{validate_resource_name, MAX_NAME_LEN};
