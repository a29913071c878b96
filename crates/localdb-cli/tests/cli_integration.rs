//! CLI subprocess integration tests.
//!
//! These tests invoke the `localdb` binary against manifests that use the
//! mock engine and deployer, and check exit codes and JSON output.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

fn localdb_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_localdb"));
    cmd.env_remove("LOCALDB_LOG");
    cmd
}

fn write_manifest(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("localdb.toml");
    std::fs::write(
        &path,
        format!(
            r#"manifest_version = 1

[engine]
backend = "mock"
health_timeout_secs = 5
health_interval_ms = 10

[deployer]
backend = "mock"
{body}"#
        ),
    )
    .unwrap();
    path
}

/// `TestDb` with database `Database1` and a package on disk.
fn test_db_manifest(dir: &Path) -> PathBuf {
    std::fs::write(dir.join("Database1.dacpac"), b"PK").unwrap();
    write_manifest(
        dir,
        r#"
[instance.TestDb]

[database.Database1]
instance = "TestDb"
dacpac = "Database1.dacpac"
"#,
    )
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn cli_version_exits_zero() {
    let output = localdb_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("localdb"));
}

#[test]
fn cli_help_lists_commands() {
    let output = localdb_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["validate", "list", "resolve", "up", "doctor"] {
        assert!(stdout.contains(command), "help must list '{command}'");
    }
}

#[test]
fn validate_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = test_db_manifest(dir.path());
    let output = localdb_bin()
        .args(["--json", "validate"])
        .arg(&manifest)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["valid"], true);
    assert_eq!(report["instances"], 1);
    assert_eq!(report["databases"], 1);
    assert_eq!(report["packages"], 1);
}

#[test]
fn validate_unknown_instance_is_manifest_error() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"
[database.Database1]
instance = "Missing"
"#,
    );
    let output = localdb_bin().arg("validate").arg(&manifest).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown instance 'Missing'"), "{stderr}");
}

#[test]
fn missing_manifest_is_manifest_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = localdb_bin()
        .arg("validate")
        .arg(dir.path().join("nope.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn list_shows_connection_strings() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = test_db_manifest(dir.path());
    let output = localdb_bin()
        .args(["--json", "list"])
        .arg(&manifest)
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows = stdout_json(&output);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "TestDb");
    assert_eq!(rows[0]["connection"], r"Data Source=(LocalDb)\TestDb");
    assert_eq!(rows[1]["name"], "Database1");
    assert_eq!(rows[1]["parent"], "TestDb");
    assert_eq!(
        rows[1]["connection"],
        r"Data Source=(LocalDb)\TestDb;Database=Database1"
    );
}

#[test]
fn resolve_falls_back_to_known_package() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Database1.dacpac"), b"PK").unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"
[project.Database1]
dacpac = "Database1.dacpac"
"#,
    );
    let output = localdb_bin()
        .args(["--json", "resolve", "Database1"])
        .arg(&manifest)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["exists"], true);
    assert!(report["package"]
        .as_str()
        .unwrap()
        .ends_with("Database1.dacpac"));
}

#[test]
fn resolve_without_package_fails() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "\n[project.Database1]\n");
    let output = localdb_bin()
        .args(["resolve", "Database1"])
        .arg(&manifest)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unable to locate SQL Server Database project package for resource Database1"),
        "{stderr}"
    );
}

#[test]
fn up_once_starts_and_deploys() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = test_db_manifest(dir.path());
    let output = localdb_bin()
        .args(["--json", "up", "--once"])
        .arg(&manifest)
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let rows = stdout_json(&output);
    let rows = rows.as_array().unwrap();
    let database = rows.iter().find(|r| r["name"] == "Database1").unwrap();
    assert_eq!(database["state"], "Running");
    assert_eq!(
        database["connection_string"],
        r"Data Source=(LocalDb)\TestDb;Database=Database1"
    );
    let instance = rows.iter().find(|r| r["name"] == "TestDb").unwrap();
    assert_eq!(instance["state"], "Running");
}

#[test]
fn up_once_missing_package_exits_resource_failed() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"
[instance.TestDb]

[database.Database1]
instance = "TestDb"
dacpac = "missing.dacpac"
"#,
    );
    let output = localdb_bin()
        .args(["--json", "up", "--once"])
        .arg(&manifest)
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let rows = stdout_json(&output);
    let database = rows
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "Database1")
        .unwrap()
        .clone();
    assert_eq!(database["state"], "FailedToStart");
    assert!(database["failure"]
        .as_str()
        .unwrap()
        .starts_with("package not found"));
}

#[test]
fn up_interactive_redeploys_then_quits() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = test_db_manifest(dir.path());
    let mut child = localdb_bin()
        .arg("up")
        .arg(&manifest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"redeploy Database1\nfrobnicate\nquit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("redeployed Database1"), "{stdout}");
    assert!(stdout.contains("unknown command: frobnicate"), "{stdout}");
}

#[test]
fn doctor_json_is_well_formed() {
    let output = localdb_bin().args(["--json", "doctor"]).output().unwrap();
    let report = stdout_json(&output);
    assert!(report["healthy"].is_boolean());
    let names: Vec<_> = report["checks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, vec!["engine", "deployer", "project_evaluation"]);
    let expected = if report["healthy"] == true { 0 } else { 1 };
    assert_eq!(output.status.code(), Some(expected));
}
