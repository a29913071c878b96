use crate::engine::{EngineBackend, InstanceInfo};
use crate::process::{command_failed, program_exists, run_captured, run_checked};
use crate::RuntimeError;
use async_trait::async_trait;
use localdb_schema::InstanceOptions;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Drives LocalDB through the `sqllocaldb` command line utility.
pub struct SqlLocalDbCli {
    program: String,
}

impl Default for SqlLocalDbCli {
    fn default() -> Self {
        Self {
            program: "sqllocaldb".to_owned(),
        }
    }
}

impl SqlLocalDbCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str], cancel: &CancellationToken) -> Result<(), RuntimeError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
        debug!("{} {}", self.program, args.join(" "));
        run_checked(&self.program, &args, cancel).await?;
        Ok(())
    }

    async fn info_with(
        &self,
        instance: &str,
        cancel: &CancellationToken,
    ) -> Result<InstanceInfo, RuntimeError> {
        let args = vec!["info".to_owned(), instance.to_owned()];
        let output = run_captured(&self.program, &args, cancel).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if reports_missing(&stdout) || reports_missing(&stderr) {
            return Ok(InstanceInfo::missing(instance));
        }
        if !output.status.success() {
            return Err(command_failed(&self.program, &output));
        }
        parse_info_output(instance, &stdout).ok_or_else(|| RuntimeError::InvalidOutput {
            program: self.program.clone(),
            detail: format!("no instance details for '{instance}'"),
        })
    }
}

fn reports_missing(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("doesn't exist") || lower.contains("does not exist") || lower.contains("is not created")
}

/// Parse the key/value block printed by `sqllocaldb info <instance>`.
///
/// Returns `None` when the block carries no `Name:` line.
pub fn parse_info_output(instance: &str, text: &str) -> Option<InstanceInfo> {
    let mut info = InstanceInfo {
        name: String::new(),
        exists: true,
        running: false,
        version: None,
        pipe_name: None,
    };

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => value.clone_into(&mut info.name),
            "version" if !value.is_empty() => info.version = Some(value.to_owned()),
            "state" => info.running = value.eq_ignore_ascii_case("running"),
            "instance pipe name" if !value.is_empty() => info.pipe_name = Some(value.to_owned()),
            _ => {}
        }
    }

    if info.name.is_empty() {
        return None;
    }
    if !info.name.eq_ignore_ascii_case(instance) {
        warn!(
            "sqllocaldb reported instance '{}' when asked for '{instance}'",
            info.name
        );
    }
    Some(info)
}

#[async_trait]
impl EngineBackend for SqlLocalDbCli {
    fn name(&self) -> &'static str {
        "sqllocaldb"
    }

    fn available(&self) -> bool {
        program_exists(&self.program, "versions")
    }

    async fn info(&self, instance: &str) -> Result<InstanceInfo, RuntimeError> {
        self.info_with(instance, &CancellationToken::new()).await
    }

    async fn get_or_create(
        &self,
        instance: &str,
        options: &InstanceOptions,
        cancel: &CancellationToken,
    ) -> Result<InstanceInfo, RuntimeError> {
        let info = self.info_with(instance, cancel).await?;
        if info.exists {
            return Ok(info);
        }

        match options.version.as_deref() {
            Some(version) => self.run(&["create", instance, version], cancel).await?,
            None => self.run(&["create", instance], cancel).await?,
        }

        let info = self.info_with(instance, cancel).await?;
        if info.exists {
            Ok(info)
        } else {
            Err(RuntimeError::InstanceNotFound(instance.to_owned()))
        }
    }

    async fn start(
        &self,
        instance: &str,
        cancel: &CancellationToken,
    ) -> Result<InstanceInfo, RuntimeError> {
        self.run(&["start", instance], cancel).await?;
        let info = self.info_with(instance, cancel).await?;
        if !info.exists {
            return Err(RuntimeError::InstanceNotFound(instance.to_owned()));
        }
        Ok(info)
    }

    async fn stop(&self, instance: &str, timeout: Duration) -> Result<(), RuntimeError> {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(timeout, self.run(&["stop", instance], &cancel)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("instance '{instance}' did not stop within {timeout:?}, killing it");
                self.run(&["stop", instance, "-k"], &cancel).await
            }
        }
    }

    async fn delete(&self, instance: &str) -> Result<(), RuntimeError> {
        self.run(&["delete", instance], &CancellationToken::new())
            .await
    }
}
