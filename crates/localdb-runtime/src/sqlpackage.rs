use crate::deployer::{DeployBackend, DeployRequest, MessageSink};
use crate::process::program_exists;
use crate::RuntimeError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Publishes packages with the `sqlpackage` command line utility.
pub struct SqlPackageCli {
    program: String,
}

impl Default for SqlPackageCli {
    fn default() -> Self {
        Self {
            program: "sqlpackage".to_owned(),
        }
    }
}

impl SqlPackageCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

fn bool_prop(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Build the `sqlpackage` argument list for publishing `request`.
///
/// The target database is carried by the connection string: sqlpackage
/// refuses `/TargetDatabaseName` next to `/TargetConnectionString`.
pub fn publish_args(request: &DeployRequest) -> Vec<String> {
    let opts = &request.options;
    let mut args = vec![
        "/Action:Publish".to_owned(),
        format!("/SourceFile:{}", request.package_path.display()),
        format!("/TargetConnectionString:{}", request.connection_string),
        format!(
            "/p:CreateNewDatabase={}",
            bool_prop(!request.upgrade_existing)
        ),
        format!(
            "/p:BlockOnPossibleDataLoss={}",
            bool_prop(opts.block_on_possible_data_loss)
        ),
        format!(
            "/p:DropObjectsNotInSource={}",
            bool_prop(opts.drop_objects_not_in_source)
        ),
    ];
    if let Some(secs) = opts.command_timeout_secs {
        args.push(format!("/p:CommandTimeout={secs}"));
    }
    for (key, value) in &opts.properties {
        args.push(format!("/p:{key}={value}"));
    }
    args
}

#[async_trait]
impl DeployBackend for SqlPackageCli {
    fn name(&self) -> &'static str {
        "sqlpackage"
    }

    fn available(&self) -> bool {
        program_exists(&self.program, "/Version:true")
    }

    async fn deploy(
        &self,
        request: &DeployRequest,
        cancel: &CancellationToken,
        on_message: MessageSink<'_>,
    ) -> Result<(), RuntimeError> {
        let args = publish_args(request);
        debug!(
            "{} publishing {} to {}",
            self.program,
            request.package_path.display(),
            request.database_name
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| RuntimeError::InvalidOutput {
            program: self.program.clone(),
            detail: "stdout not captured".to_owned(),
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| RuntimeError::InvalidOutput {
            program: self.program.clone(),
            detail: "stderr not captured".to_owned(),
        })?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await.map(|_| buf)
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) if !line.trim().is_empty() => on_message(line.trim_end()),
                    Some(_) => {}
                    None => break,
                },
                () = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(RuntimeError::Cancelled);
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status?,
            () = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(RuntimeError::Cancelled);
            }
        };
        let stderr = stderr_task
            .await
            .map_err(|e| RuntimeError::DeployFailed(format!("stderr reader failed: {e}")))??;

        if status.success() {
            Ok(())
        } else {
            let detail = stderr.trim();
            Err(RuntimeError::DeployFailed(if detail.is_empty() {
                format!("{} exited with {status}", self.program)
            } else {
                detail.to_owned()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use localdb_schema::DeployOptions;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn request() -> DeployRequest {
        DeployRequest {
            package_path: PathBuf::from("bin/Debug/Database1.dacpac"),
            connection_string: r"Data Source=(LocalDb)\TestDb;Database=Database1".to_owned(),
            database_name: "Database1".to_owned(),
            upgrade_existing: true,
            options: DeployOptions::default(),
        }
    }

    #[test]
    fn publish_args_upgrade_in_place() {
        let args = publish_args(&request());
        assert_eq!(args[0], "/Action:Publish");
        assert!(args.contains(&"/SourceFile:bin/Debug/Database1.dacpac".to_owned()));
        assert!(args.contains(
            &r"/TargetConnectionString:Data Source=(LocalDb)\TestDb;Database=Database1".to_owned()
        ));
        assert!(args.contains(&"/p:CreateNewDatabase=False".to_owned()));
        assert!(args.contains(&"/p:BlockOnPossibleDataLoss=True".to_owned()));
        assert!(args.contains(&"/p:DropObjectsNotInSource=False".to_owned()));
        assert!(!args.iter().any(|a| a.starts_with("/TargetDatabaseName")));
    }

    #[test]
    fn publish_args_carry_options() {
        let mut req = request();
        req.upgrade_existing = false;
        req.options.drop_objects_not_in_source = true;
        req.options.command_timeout_secs = Some(120);
        req.options
            .properties
            .insert("IgnorePermissions".to_owned(), "True".to_owned());

        let args = publish_args(&req);
        assert!(args.contains(&"/p:CreateNewDatabase=True".to_owned()));
        assert!(args.contains(&"/p:DropObjectsNotInSource=True".to_owned()));
        assert!(args.contains(&"/p:CommandTimeout=120".to_owned()));
        assert_eq!(args.last().unwrap(), "/p:IgnorePermissions=True");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let cli = SqlPackageCli::with_program("localdb-host-no-such-sqlpackage");
        let cancel = CancellationToken::new();
        let err = cli.deploy(&request(), &cancel, &|_: &str| {}).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forwards_output_lines() {
        // `echo` stands in for sqlpackage: it prints its arguments and exits 0.
        let cli = SqlPackageCli::with_program("echo");
        let cancel = CancellationToken::new();
        let seen = Mutex::new(Vec::new());
        cli.deploy(&request(), &cancel, &|line: &str| {
            seen.lock().unwrap().push(line.to_owned());
        })
        .await
        .unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("/Action:Publish"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_is_deploy_failure() {
        let cli = SqlPackageCli::with_program("false");
        let cancel = CancellationToken::new();
        let err = cli.deploy(&request(), &cancel, &|_: &str| {}).await.unwrap_err();
        assert!(matches!(err, RuntimeError::DeployFailed(_)));
    }
}
