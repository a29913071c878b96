use crate::manifest::{ManifestError, ManifestV1};
use std::collections::BTreeSet;

/// Longest name LocalDB accepts for an instance; applied to every resource.
pub const MAX_NAME_LEN: usize = 128;

const FORBIDDEN_CHARS: &[char] = &['\\', ';', '\'', '"', '='];

/// Check that `name` can be used as a resource, instance, or database name.
///
/// Names end up inside connection strings, so anything that would need
/// quoting there is refused.
pub fn validate_resource_name(kind: &'static str, name: &str) -> Result<(), ManifestError> {
    let invalid = |reason: &str| ManifestError::InvalidName {
        kind,
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid("must be at most 128 characters"));
    }
    if name.trim() != name {
        return Err(invalid("must not start or end with whitespace"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(&format!("contains forbidden character {c:?}")));
    }
    Ok(())
}

impl ManifestV1 {
    /// Validate names and cross references between sections.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::UnsupportedVersion(self.manifest_version));
        }
        if self.engine.backend.trim().is_empty() {
            return Err(ManifestError::EmptyBackend { section: "engine" });
        }
        if self.deployer.backend.trim().is_empty() {
            return Err(ManifestError::EmptyBackend {
                section: "deployer",
            });
        }

        let mut seen = BTreeSet::new();
        let mut claim = |name: &str| {
            if seen.insert(name.to_owned()) {
                Ok(())
            } else {
                Err(ManifestError::DuplicateResource(name.to_owned()))
            }
        };

        for name in self.instance.keys() {
            validate_resource_name("instance", name)?;
            claim(name)?;
        }

        let mut packaged = BTreeSet::new();
        for (name, db) in &self.database {
            validate_resource_name("database", name)?;
            claim(name)?;
            validate_resource_name("database", db.database_name_or(name))?;
            if !self.instance.contains_key(&db.instance) {
                return Err(ManifestError::UnknownInstance {
                    database: name.clone(),
                    instance: db.instance.clone(),
                });
            }
            if db.dacpac.is_some() {
                packaged.insert(name.clone());
            }
        }

        for (name, project) in &self.project {
            validate_resource_name("project", name)?;
            claim(name)?;
            let Some(target) = &project.target else {
                continue;
            };
            if !self.database.contains_key(target) {
                return Err(ManifestError::UnknownDatabase {
                    project: name.clone(),
                    database: target.clone(),
                });
            }
            if !packaged.insert(target.clone()) {
                return Err(ManifestError::DuplicatePackage(target.clone()));
            }
        }

        Ok(())
    }
}
