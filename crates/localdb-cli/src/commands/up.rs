use super::{
    colorize_state, json_pretty, load_manifest, spin_fail, spin_ok, spinner, EXIT_RESOURCE_FAILED,
    EXIT_SUCCESS,
};
use localdb_core::{App, AppBuilder, LogLevel, MsBuildEvaluator, Services, REDEPLOY_COMMAND};
use localdb_runtime::{
    check_deployer_prereqs, check_engine_prereqs, check_project_prereqs, format_missing,
};
use localdb_schema::ManifestV1;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

pub fn run(manifest_path: &Path, once: bool, json: bool) -> Result<u8, String> {
    let (manifest, base_dir) = load_manifest(manifest_path)?;
    if std::env::var("LOCALDB_SKIP_PREREQS").as_deref() != Ok("1") {
        check_prereqs(&manifest)?;
    }

    let services = Services::from_manifest(&manifest).map_err(|e| e.to_string())?;
    let app = AppBuilder::from_manifest(&manifest, &base_dir, &MsBuildEvaluator::new())
        .map_err(|e| e.to_string())?
        .build(services);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start async runtime: {e}"))?;
    let cancel = CancellationToken::new();
    install_signal_handler(cancel.clone());

    let result = runtime.block_on(host(&app, once, json, &cancel));
    // A pending stdin read must not keep the process alive.
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

async fn host(app: &App, once: bool, json: bool, cancel: &CancellationToken) -> Result<u8, String> {
    let pb = (!json).then(|| spinner("Starting resources..."));
    app.start(cancel).await;
    let failed = app.failed();
    if let Some(pb) = &pb {
        if failed.is_empty() {
            spin_ok(pb, "All resources started");
        } else {
            spin_fail(pb, &format!("{} resources failed to start", failed.len()));
        }
    }
    print_status(app, json)?;

    if !once && !cancel.is_cancelled() {
        interact(app, json, cancel).await?;
    }

    let code = if app.failed().is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_RESOURCE_FAILED
    };
    app.shutdown().await;
    Ok(code)
}

async fn interact(app: &App, json: bool, cancel: &CancellationToken) -> Result<(), String> {
    if !json {
        println!("Commands: status, redeploy <database>, logs <resource>, quit");
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.map_err(|e| format!("failed to read stdin: {e}"))?,
            () = cancel.cancelled() => break,
        };
        let Some(line) = line else {
            break;
        };

        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (None, _) => {}
            (Some("status"), _) => print_status(app, json)?,
            (Some("redeploy"), Some(database)) => {
                match app.execute_command(database, REDEPLOY_COMMAND, cancel).await {
                    Ok(result) if json => println!("{}", json_pretty(&result)?),
                    Ok(result) if result.success => println!("redeployed {database}"),
                    Ok(result) => println!(
                        "redeploy of {database} failed: {}",
                        result.error_message.unwrap_or_default()
                    ),
                    Err(e) => println!("error: {e}"),
                }
            }
            (Some("logs"), Some(resource)) => {
                for entry in app.logs(resource) {
                    let level = match entry.level {
                        LogLevel::Info => "info",
                        LogLevel::Warn => "warn",
                        LogLevel::Error => "error",
                    };
                    println!("{} {level:<5} {}", entry.at.format("%H:%M:%S"), entry.message);
                }
            }
            (Some("quit" | "exit"), _) => break,
            _ => println!("unknown command: {}", line.trim()),
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusRow {
    name: String,
    resource_type: &'static str,
    state: String,
    connection_string: Option<String>,
    failure: Option<String>,
}

fn print_status(app: &App, json: bool) -> Result<(), String> {
    let rows: Vec<StatusRow> = app
        .model()
        .iter()
        .map(|resource| {
            let snapshot = app.snapshot(resource.name());
            StatusRow {
                name: resource.name().to_owned(),
                resource_type: resource.resource_type(),
                state: snapshot
                    .as_ref()
                    .map(|s| s.state.to_string())
                    .unwrap_or_default(),
                connection_string: app.connection_string(resource.name()),
                failure: snapshot
                    .and_then(|s| s.failure)
                    .map(|f| f.to_string()),
            }
        })
        .collect();

    if json {
        println!("{}", json_pretty(&rows)?);
        return Ok(());
    }
    println!("{:<20} {:<16} {:<14} CONNECTION", "NAME", "TYPE", "STATE");
    for row in &rows {
        println!(
            "{:<20} {:<16} {:<14} {}",
            row.name,
            row.resource_type,
            colorize_state(&row.state),
            row.connection_string.as_deref().unwrap_or("")
        );
        if let Some(failure) = &row.failure {
            println!("    {failure}");
        }
    }
    Ok(())
}

fn check_prereqs(manifest: &ManifestV1) -> Result<(), String> {
    let mut missing = Vec::new();
    if manifest.engine.backend == "sqllocaldb" {
        missing.extend(check_engine_prereqs());
    }
    if manifest.deployer.backend == "sqlpackage" {
        missing.extend(check_deployer_prereqs(
            manifest.deployer.executable.as_deref(),
        ));
    }
    if manifest.project.values().any(|p| p.path.is_some()) {
        missing.extend(check_project_prereqs());
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format_missing(&missing))
    }
}

fn install_signal_handler(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(1);
        }
        cancel.cancel();
        eprintln!("\nshutdown requested, stopping instances...");
    });
}
