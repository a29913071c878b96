use crate::process::program_exists;
use std::fmt;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

/// Check that the LocalDB engine tooling can be launched.
pub fn check_engine_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !program_exists("sqllocaldb", "versions") {
        missing.push(MissingPrereq {
            name: "sqllocaldb",
            purpose: "creating and starting LocalDB instances",
            install_hint: "SQL Server Express LocalDB (Windows only), e.g. winget install Microsoft.SQLServer.2022.Express",
        });
    }
    missing
}

/// Check that `program` (default `sqlpackage`) can publish packages.
pub fn check_deployer_prereqs(program: Option<&str>) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !program_exists(program.unwrap_or("sqlpackage"), "/Version:true") {
        missing.push(MissingPrereq {
            name: "sqlpackage",
            purpose: "deploying .dacpac packages",
            install_hint: "dotnet tool install -g microsoft.sqlpackage",
        });
    }
    missing
}

/// Check that SQL project files can be evaluated for their output path.
pub fn check_project_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !program_exists("dotnet", "--version") {
        missing.push(MissingPrereq {
            name: "dotnet",
            purpose: "evaluating .sqlproj files for their package path",
            install_hint: "install the .NET SDK 8 or newer from https://dot.net",
        });
    }
    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nUse the \"mock\" backends to run without LocalDB tooling.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "sqlpackage",
            purpose: "deploying packages",
            install_hint: "dotnet tool install -g microsoft.sqlpackage",
        };
        let s = format!("{m}");
        assert!(s.contains("sqlpackage"));
        assert!(s.contains("deploying packages"));
        assert!(s.contains("dotnet tool install"));
    }

    #[test]
    fn format_missing_lists_every_item() {
        let items = vec![
            MissingPrereq {
                name: "sqllocaldb",
                purpose: "instances",
                install_hint: "LocalDB",
            },
            MissingPrereq {
                name: "dotnet",
                purpose: "projects",
                install_hint: ".NET SDK",
            },
        ];
        let output = format_missing(&items);
        assert!(output.starts_with("missing prerequisites:"));
        assert!(output.contains("sqllocaldb"));
        assert!(output.contains("dotnet"));
    }

    #[test]
    fn unknown_deployer_program_is_missing() {
        let missing = check_deployer_prereqs(Some("localdb-host-no-such-sqlpackage"));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "sqlpackage");
    }
}
