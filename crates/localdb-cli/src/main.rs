mod commands;

use clap::{Parser, Subcommand};
use commands::{EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "localdb",
    version,
    about = "Provision LocalDB instances and deploy dacpac packages into them"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check a manifest for errors without touching any instance.
    Validate {
        /// Path to manifest TOML file.
        #[arg(default_value = "localdb.toml")]
        manifest: PathBuf,
    },
    /// List the resources a manifest declares.
    List {
        /// Path to manifest TOML file.
        #[arg(default_value = "localdb.toml")]
        manifest: PathBuf,
    },
    /// Print the package path a SQL project resolves to.
    Resolve {
        /// Project name as declared in the manifest.
        project: String,
        /// Path to manifest TOML file.
        #[arg(default_value = "localdb.toml")]
        manifest: PathBuf,
    },
    /// Start every instance and deploy the declared packages.
    Up {
        /// Path to manifest TOML file.
        #[arg(default_value = "localdb.toml")]
        manifest: PathBuf,
        /// Report the outcome and shut down instead of waiting for commands.
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Check that the LocalDB, sqlpackage, and .NET tooling is installed.
    Doctor,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LOCALDB_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Validate { manifest } => commands::validate::run(&manifest, json_output),
        Commands::List { manifest } => commands::list::run(&manifest, json_output),
        Commands::Resolve { project, manifest } => {
            commands::resolve::run(&manifest, &project, json_output)
        }
        Commands::Up { manifest, once } => commands::up::run(&manifest, once, json_output),
        Commands::Doctor => commands::doctor::run(json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:")
                || msg.starts_with("failed to parse manifest")
                || msg.starts_with("failed to read manifest")
            {
                EXIT_MANIFEST_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
