use crate::resource::SqlProjectResource;
use crate::CoreError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Build output of SDK-style SQL projects.
pub const SQL_TARGET_PATH: &str = "SqlTargetPath";
/// Generic build output, used by older project formats.
pub const TARGET_PATH: &str = "TargetPath";

/// Evaluates build properties of a project file.
pub trait ProjectEvaluator: Send + Sync {
    /// Return the evaluated value of each of `properties` that is defined.
    fn evaluate(
        &self,
        project: &Path,
        properties: &[&str],
    ) -> Result<HashMap<String, String>, CoreError>;
}

/// Evaluates projects with `dotnet msbuild -getProperty:...`.
#[derive(Debug, Clone)]
pub struct MsBuildEvaluator {
    program: String,
}

impl Default for MsBuildEvaluator {
    fn default() -> Self {
        Self {
            program: "dotnet".to_owned(),
        }
    }
}

impl MsBuildEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_owned(),
        }
    }
}

impl ProjectEvaluator for MsBuildEvaluator {
    fn evaluate(
        &self,
        project: &Path,
        properties: &[&str],
    ) -> Result<HashMap<String, String>, CoreError> {
        let evaluation_error = |detail: String| CoreError::ProjectEvaluation {
            path: project.to_path_buf(),
            detail,
        };

        let mut cmd = Command::new(&self.program);
        cmd.arg("msbuild").arg(project);
        for property in properties {
            cmd.arg(format!("-getProperty:{property}"));
        }
        debug!("evaluating {} with {}", project.display(), self.program);

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| evaluation_error(format!("failed to run {}: {e}", self.program)))?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Err(evaluation_error(format!("{}: {detail}", output.status)));
        }

        parse_get_property_output(&String::from_utf8_lossy(&output.stdout), properties)
            .map_err(evaluation_error)
    }
}

/// Parse what `msbuild -getProperty` prints.
///
/// One property prints its raw value; several print
/// `{"Properties": {"Name": "value", ...}}`.
pub fn parse_get_property_output(
    text: &str,
    properties: &[&str],
) -> Result<HashMap<String, String>, String> {
    let text = text.trim();
    let mut values = HashMap::new();

    if let [single] = properties {
        if !text.is_empty() {
            values.insert((*single).to_owned(), text.to_owned());
        }
        return Ok(values);
    }
    if text.is_empty() {
        return Ok(values);
    }

    let parsed: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("unexpected msbuild output: {e}"))?;
    let Some(map) = parsed.get("Properties").and_then(|p| p.as_object()) else {
        return Err("msbuild output has no \"Properties\" object".to_owned());
    };
    for property in properties {
        if let Some(value) = map.get(*property).and_then(|v| v.as_str()) {
            values.insert((*property).to_owned(), value.to_owned());
        }
    }
    Ok(values)
}

/// Locate the `.dacpac` produced by a SQL project.
///
/// A non-blank `SqlTargetPath` wins over a non-blank `TargetPath`, which wins
/// over the project's known package annotation. Relative evaluated paths are
/// taken relative to the project directory.
pub fn resolve_package_path(
    project: &SqlProjectResource,
    evaluator: &dyn ProjectEvaluator,
) -> Result<PathBuf, CoreError> {
    if let Some(project_path) = &project.project_path {
        let values = evaluator.evaluate(project_path, &[SQL_TARGET_PATH, TARGET_PATH])?;
        let evaluated = [SQL_TARGET_PATH, TARGET_PATH]
            .iter()
            .filter_map(|key| values.get(*key))
            .map(|value| value.trim())
            .find(|value| !value.is_empty());

        if let Some(value) = evaluated {
            let path = PathBuf::from(value);
            if path.is_relative() {
                let base = project_path.parent().unwrap_or_else(|| Path::new(""));
                return Ok(base.join(path));
            }
            return Ok(path);
        }
    }

    project
        .dacpac
        .clone()
        .ok_or_else(|| CoreError::PackageNotFound {
            project: project.name.clone(),
        })
}
