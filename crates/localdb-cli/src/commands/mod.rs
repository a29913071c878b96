pub mod doctor;
pub mod list;
pub mod resolve;
pub mod up;
pub mod validate;

use indicatif::{ProgressBar, ProgressStyle};
use localdb_schema::{parse_manifest_file, ManifestV1};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_RESOURCE_FAILED: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Parse and validate a manifest. Relative paths in it are resolved
/// against the returned directory.
pub fn load_manifest(path: &Path) -> Result<(ManifestV1, PathBuf), String> {
    let manifest = parse_manifest_file(path).map_err(|e| e.to_string())?;
    manifest
        .validate()
        .map_err(|e| format!("manifest error: {e}"))?;
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Ok((manifest, base_dir))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "Running" => Style::new().green().apply_to(state).to_string(),
        "Starting" | "Stopping" => Style::new().cyan().apply_to(state).to_string(),
        "FailedToStart" => Style::new().red().bold().apply_to(state).to_string(),
        "NotStarted" => Style::new().yellow().apply_to(state).to_string(),
        "Stopped" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"state": "Running"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"state\""));
        assert!(result.contains("\"Running\""));
    }

    #[test]
    fn colorize_keeps_state_text() {
        for state in [
            "Running",
            "Starting",
            "Stopping",
            "FailedToStart",
            "NotStarted",
            "Stopped",
        ] {
            assert!(colorize_state(state).contains(state));
        }
        assert_eq!(colorize_state("unknown"), "unknown");
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_MANIFEST_ERROR);
        assert_ne!(EXIT_MANIFEST_ERROR, EXIT_RESOURCE_FAILED);
    }

    #[test]
    fn load_manifest_returns_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("localdb.toml");
        fs::write(&path, "manifest_version = 1\n").unwrap();
        let (manifest, base) = load_manifest(&path).unwrap();
        assert_eq!(manifest.manifest_version, 1);
        assert_eq!(base, dir.path());
    }

    #[test]
    fn missing_manifest_is_a_read_error() {
        let err = load_manifest(Path::new("does-not-exist.toml")).unwrap_err();
        assert!(err.starts_with("failed to read manifest"));
    }

    #[test]
    fn invalid_manifest_is_a_manifest_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("localdb.toml");
        fs::write(&path, "manifest_version = 2\n").unwrap();
        let err = load_manifest(&path).unwrap_err();
        assert!(err.starts_with("manifest error:"), "{err}");
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("starting...");
        spin_ok(&pb, "done");
        let pb = spinner("starting...");
        spin_fail(&pb, "failed");
    }
}
