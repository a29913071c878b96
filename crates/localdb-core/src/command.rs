use crate::lifecycle::ResourceState;
use crate::notify::ResourceSnapshot;
use crate::resource::DatabaseResource;
use crate::services::Services;
use crate::CoreError;
use localdb_schema::DeployOptions;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const REDEPLOY_COMMAND: &str = "redeploy";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum CommandState {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum IconVariant {
    Regular,
    Filled,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExecuteCommandResult {
    pub success: bool,
    pub error_message: Option<String>,
}

impl ExecuteCommandResult {
    pub fn success() -> Self {
        Self {
            success: true,
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
        }
    }
}

pub struct CommandContext {
    pub resource: String,
    pub services: Arc<Services>,
    pub cancel: CancellationToken,
}

type CommandFuture = Pin<Box<dyn Future<Output = ExecuteCommandResult> + Send>>;
type CommandHandler = Arc<dyn Fn(CommandContext) -> CommandFuture + Send + Sync>;
type StateFn = Arc<dyn Fn(Option<&ResourceSnapshot>) -> CommandState + Send + Sync>;

/// An operator action attached to a resource.
#[derive(Clone)]
pub struct ResourceCommand {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub icon_name: String,
    pub icon_variant: IconVariant,
    pub is_highlighted: bool,
    update_state: StateFn,
    handler: CommandHandler,
}

impl std::fmt::Debug for ResourceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCommand")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

impl ResourceCommand {
    pub fn new<S, H, Fut>(name: &str, display_name: &str, update_state: S, handler: H) -> Self
    where
        S: Fn(Option<&ResourceSnapshot>) -> CommandState + Send + Sync + 'static,
        H: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ExecuteCommandResult> + Send + 'static,
    {
        Self {
            name: name.to_owned(),
            display_name: display_name.to_owned(),
            description: String::new(),
            icon_name: String::new(),
            icon_variant: IconVariant::Regular,
            is_highlighted: false,
            update_state: Arc::new(update_state),
            handler: Arc::new(move |ctx| -> CommandFuture { Box::pin(handler(ctx)) }),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon_name: &str, variant: IconVariant) -> Self {
        self.icon_name = icon_name.to_owned();
        self.icon_variant = variant;
        self
    }

    #[must_use]
    pub fn highlighted(mut self) -> Self {
        self.is_highlighted = true;
        self
    }

    /// Availability given the resource's last snapshot.
    pub fn state(&self, snapshot: Option<&ResourceSnapshot>) -> CommandState {
        (self.update_state)(snapshot)
    }

    pub(crate) fn run(&self, ctx: CommandContext) -> CommandFuture {
        (self.handler)(ctx)
    }
}

/// Enabled only while the resource is `Running`.
pub fn enabled_when_running(snapshot: Option<&ResourceSnapshot>) -> CommandState {
    match snapshot {
        Some(s) if s.state == ResourceState::Running => CommandState::Enabled,
        _ => CommandState::Disabled,
    }
}

/// Command that deploys `package_path` into `database` again.
pub fn redeploy_command(
    database: DatabaseResource,
    package_path: PathBuf,
    options: DeployOptions,
) -> ResourceCommand {
    let database = Arc::new(database);
    ResourceCommand::new(
        REDEPLOY_COMMAND,
        "Redeploy",
        enabled_when_running,
        move |ctx: CommandContext| {
            let database = Arc::clone(&database);
            let package_path = package_path.clone();
            let options = options.clone();
            async move {
                let state = ctx
                    .services
                    .dacpac
                    .deploy(&package_path, &database, &options, &ctx.cancel)
                    .await;
                if state == ResourceState::Running {
                    ExecuteCommandResult::success()
                } else {
                    let message = ctx
                        .services
                        .notifications
                        .snapshot(&database.name)
                        .and_then(|s| s.failure)
                        .map_or_else(|| format!("deployment ended in {state}"), |f| f.message);
                    ExecuteCommandResult::failure(message)
                }
            }
        },
    )
    .with_description("Redeploys the associated dacpac to the target database.")
    .with_icon("ArrowReset", IconVariant::Filled)
    .highlighted()
}

/// Commands attached to each resource.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Mutex<BTreeMap<String, Vec<ResourceCommand>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, resource: &str, command: ResourceCommand) {
        if let Ok(mut map) = self.commands.lock() {
            map.entry(resource.to_owned()).or_default().push(command);
        }
    }

    pub fn for_resource(&self, resource: &str) -> Vec<ResourceCommand> {
        self.commands
            .lock()
            .ok()
            .and_then(|map| map.get(resource).cloned())
            .unwrap_or_default()
    }

    /// Run `name` on `resource` if its current state enables it.
    pub async fn execute(
        &self,
        resource: &str,
        name: &str,
        services: &Arc<Services>,
        cancel: &CancellationToken,
    ) -> Result<ExecuteCommandResult, CoreError> {
        let command = self
            .for_resource(resource)
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CoreError::UnknownCommand {
                resource: resource.to_owned(),
                command: name.to_owned(),
            })?;

        let snapshot = services.notifications.snapshot(resource);
        if command.state(snapshot.as_ref()) == CommandState::Disabled {
            return Err(CoreError::CommandDisabled {
                resource: resource.to_owned(),
                command: name.to_owned(),
            });
        }

        Ok(command
            .run(CommandContext {
                resource: resource.to_owned(),
                services: Arc::clone(services),
                cancel: cancel.clone(),
            })
            .await)
    }
}
