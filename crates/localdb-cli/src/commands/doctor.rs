use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use localdb_runtime::{
    check_deployer_prereqs, check_engine_prereqs, check_project_prereqs, MissingPrereq,
};
use serde::Serialize;

pub fn run(json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check(
        &mut checks,
        &mut all_pass,
        "engine",
        "LocalDB engine tooling found",
        &check_engine_prereqs(),
        true,
    );
    check(
        &mut checks,
        &mut all_pass,
        "deployer",
        "Package deployer found",
        &check_deployer_prereqs(None),
        true,
    );
    // Only projects resolved through their .sqlproj need the SDK.
    check(
        &mut checks,
        &mut all_pass,
        "project_evaluation",
        ".NET SDK found for project evaluation",
        &check_project_prereqs(),
        false,
    );

    print_results(&checks, all_pass, json_output)
}

fn check(
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
    name: &str,
    ok_message: &str,
    missing: &[MissingPrereq],
    required: bool,
) {
    if missing.is_empty() {
        checks.push(Check::new(name, "pass", ok_message.to_owned()));
        return;
    }
    let detail = missing
        .iter()
        .map(|m| format!("{} is missing ({}); install: {}", m.name, m.purpose, m.install_hint))
        .collect::<Vec<_>>()
        .join("; ");
    if required {
        *all_pass = false;
        checks.push(Check::new(name, "fail", detail));
    } else {
        checks.push(Check::new(name, "warn", detail));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let report = serde_json::json!({
            "healthy": all_pass,
            "checks": checks,
        });
        println!("{}", json_pretty(&report)?);
    } else {
        println!("LocalDB Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. Use the \"mock\" backends to run without LocalDB tooling.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: String) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_prereq_only_warns() {
        let mut checks = Vec::new();
        let mut all_pass = true;
        let missing = [MissingPrereq {
            name: "dotnet",
            purpose: "evaluating projects",
            install_hint: "https://dot.net",
        }];
        check(&mut checks, &mut all_pass, "project_evaluation", "ok", &missing, false);
        assert!(all_pass);
        assert_eq!(checks[0].status, "warn");
        assert!(checks[0].message.contains("dotnet is missing"));
    }

    #[test]
    fn required_prereq_fails() {
        let mut checks = Vec::new();
        let mut all_pass = true;
        let missing = [MissingPrereq {
            name: "sqllocaldb",
            purpose: "instances",
            install_hint: "SQL Server Express LocalDB",
        }];
        check(&mut checks, &mut all_pass, "engine", "ok", &missing, true);
        assert!(!all_pass);
        assert_eq!(checks[0].status, "fail");

        check(&mut checks, &mut all_pass, "deployer", "found", &[], true);
        assert_eq!(checks[1].status, "pass");
        assert_eq!(checks[1].message, "found");
    }
}
