use crate::command::{redeploy_command, CommandRegistry, ExecuteCommandResult, ResourceCommand};
use crate::events::{AppEvent, EventKind};
use crate::health::check_key;
use crate::lifecycle::ResourceState;
use crate::logs::LogLine;
use crate::notify::{Failure, ResourceSnapshot};
use crate::package::{resolve_package_path, ProjectEvaluator};
use crate::resource::{
    AppModel, DatabaseResource, InstanceResource, Resource, SqlProjectResource,
};
use crate::services::Services;
use crate::CoreError;
use chrono::Local;
use localdb_schema::{DeployOptions, InstanceOptions, ManifestV1};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHandle(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHandle(String);

impl InstanceHandle {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl DatabaseHandle {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl ProjectHandle {
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// A package to deploy into a database once its instance is ready.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackageBinding {
    pub database: String,
    pub path: PathBuf,
    pub options: DeployOptions,
    /// Project the path was resolved from, if any.
    pub project: Option<String>,
}

/// Registers resources and wires them into a runnable [`App`].
#[derive(Debug, Default)]
pub struct AppBuilder {
    model: AppModel,
    packages: Vec<PackageBinding>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instance(
        &mut self,
        name: &str,
        options: InstanceOptions,
    ) -> Result<InstanceHandle, CoreError> {
        self.model
            .add(Resource::Instance(InstanceResource::new(name, options)))?;
        Ok(InstanceHandle(name.to_owned()))
    }

    pub fn with_instance_options(
        &mut self,
        instance: &InstanceHandle,
        configure: impl FnOnce(&mut InstanceOptions),
    ) -> Result<(), CoreError> {
        configure(&mut self.model.instance_mut(instance.name())?.options);
        Ok(())
    }

    /// Register a database under `instance`. `database_name` defaults to `name`.
    pub fn add_database(
        &mut self,
        instance: &InstanceHandle,
        name: &str,
        database_name: Option<&str>,
    ) -> Result<DatabaseHandle, CoreError> {
        if self.model.get(name).is_some() {
            return Err(CoreError::DuplicateResource(name.to_owned()));
        }
        let database = DatabaseResource::new(name, database_name, instance.name());
        self.model
            .instance_mut(instance.name())?
            .add_database(name, &database.database_name);
        self.model.add(Resource::Database(database))?;
        Ok(DatabaseHandle(name.to_owned()))
    }

    /// Deploy the package at `path` into `database` whenever its instance is ready.
    pub fn with_dacpac(
        &mut self,
        database: &DatabaseHandle,
        path: impl Into<PathBuf>,
        options: DeployOptions,
    ) -> Result<(), CoreError> {
        self.bind(database, path.into(), options, None)
    }

    fn bind(
        &mut self,
        database: &DatabaseHandle,
        path: PathBuf,
        options: DeployOptions,
        project: Option<String>,
    ) -> Result<(), CoreError> {
        self.model.database(database.name())?;
        if self.packages.iter().any(|p| p.database == database.name()) {
            return Err(CoreError::Configuration(format!(
                "database '{}' already has a package",
                database.name()
            )));
        }
        self.packages.push(PackageBinding {
            database: database.name().to_owned(),
            path,
            options,
            project,
        });
        Ok(())
    }

    pub fn add_sql_project(
        &mut self,
        name: &str,
        project_path: Option<PathBuf>,
        dacpac: Option<PathBuf>,
    ) -> Result<ProjectHandle, CoreError> {
        self.model.add(Resource::Project(SqlProjectResource {
            name: name.to_owned(),
            project_path,
            dacpac,
            target: None,
        }))?;
        Ok(ProjectHandle(name.to_owned()))
    }

    /// Deploy the package of `project` into `database`.
    ///
    /// The package path is resolved now, so a project without a locatable
    /// package fails registration instead of startup.
    pub fn with_reference(
        &mut self,
        project: &ProjectHandle,
        database: &DatabaseHandle,
        options: DeployOptions,
        evaluator: &dyn ProjectEvaluator,
    ) -> Result<PathBuf, CoreError> {
        let path = resolve_package_path(self.model.project(project.name())?, evaluator)?;
        debug!(
            "project {} resolves to {}",
            project.name(),
            path.display()
        );
        self.bind(
            database,
            path.clone(),
            options,
            Some(project.name().to_owned()),
        )?;
        self.model.project_mut(project.name())?.target = Some(database.name().to_owned());
        Ok(path)
    }

    pub fn instance(&self, name: &str) -> Result<InstanceHandle, CoreError> {
        self.model.instance(name)?;
        Ok(InstanceHandle(name.to_owned()))
    }

    pub fn database(&self, name: &str) -> Result<DatabaseHandle, CoreError> {
        self.model.database(name)?;
        Ok(DatabaseHandle(name.to_owned()))
    }

    pub fn project(&self, name: &str) -> Result<ProjectHandle, CoreError> {
        self.model.project(name)?;
        Ok(ProjectHandle(name.to_owned()))
    }

    pub fn model(&self) -> &AppModel {
        &self.model
    }

    pub fn packages(&self) -> &[PackageBinding] {
        &self.packages
    }

    /// Register everything a validated manifest declares.
    ///
    /// Relative paths in the manifest are taken relative to `base_dir`.
    pub fn from_manifest(
        manifest: &ManifestV1,
        base_dir: &Path,
        evaluator: &dyn ProjectEvaluator,
    ) -> Result<Self, CoreError> {
        manifest.validate()?;
        let mut builder = Self::new();

        for (name, options) in &manifest.instance {
            builder.add_instance(name, options.clone())?;
        }
        for (name, section) in &manifest.database {
            let instance = builder.instance(&section.instance)?;
            let database = builder.add_database(&instance, name, section.database_name.as_deref())?;
            if let Some(dacpac) = &section.dacpac {
                builder.with_dacpac(&database, base_dir.join(dacpac), section.deploy.clone())?;
            }
        }
        for (name, section) in &manifest.project {
            let project = builder.add_sql_project(
                name,
                section.path.as_ref().map(|p| base_dir.join(p)),
                section.dacpac.as_ref().map(|p| base_dir.join(p)),
            )?;
            if let Some(target) = &section.target {
                let database = builder.database(target)?;
                builder.with_reference(&project, &database, section.deploy.clone(), evaluator)?;
            }
        }
        Ok(builder)
    }

    /// Register every resource with `services` and subscribe the lifecycle
    /// handlers.
    pub fn build(self, services: Services) -> App {
        let services = Arc::new(services);
        let model = Arc::new(self.model);
        let commands = CommandRegistry::new();

        for resource in model.iter() {
            services.notifications.register(
                resource.name(),
                resource.resource_type(),
                initial_properties(resource),
            );
        }

        for instance in model.instances() {
            services.health.register(instance);
            let instance = instance.clone();
            services
                .eventing
                .subscribe(EventKind::BeforeStart, move |ctx| {
                    let instance = instance.clone();
                    async move {
                        let state = ctx
                            .services
                            .provisioner
                            .provision(&instance, &ctx.cancel)
                            .await;
                        if state == ResourceState::Running {
                            let event = AppEvent::ConnectionStringAvailable {
                                resource: instance.name.clone(),
                            };
                            ctx.services
                                .eventing
                                .publish(event, &ctx.services, &ctx.cancel)
                                .await;
                        }
                    }
                });
        }

        for database in model.databases() {
            let packaged = self.packages.iter().any(|p| p.database == database.name);
            let name = database.name.clone();
            services.eventing.subscribe_for(
                EventKind::ConnectionStringAvailable,
                &database.parent,
                move |ctx| {
                    let name = name.clone();
                    async move {
                        ctx.services
                            .logs
                            .logger(&name)
                            .info("Connection string is available");
                        if !packaged {
                            mark_running(&ctx.services, &name);
                        }
                        let event = AppEvent::ConnectionStringAvailable { resource: name };
                        ctx.services
                            .eventing
                            .publish(event, &ctx.services, &ctx.cancel)
                            .await;
                    }
                },
            );
        }

        for binding in &self.packages {
            let Ok(database) = model.database(&binding.database).cloned() else {
                continue;
            };
            commands.add(
                &database.name,
                redeploy_command(
                    database.clone(),
                    binding.path.clone(),
                    binding.options.clone(),
                ),
            );

            let parent = database.parent.clone();
            let database = Arc::new(database);
            let path = binding.path.clone();
            let options = binding.options.clone();
            services
                .eventing
                .subscribe_for(EventKind::ResourceReady, &parent, move |ctx| {
                    let database = Arc::clone(&database);
                    let path = path.clone();
                    let options = options.clone();
                    async move {
                        ctx.services
                            .dacpac
                            .deploy(&path, &database, &options, &ctx.cancel)
                            .await;
                    }
                });
        }

        App {
            model,
            services,
            packages: self.packages,
            commands,
        }
    }
}

fn initial_properties(resource: &Resource) -> Vec<(String, String)> {
    match resource {
        Resource::Instance(i) => i
            .options
            .version
            .iter()
            .map(|v| ("Version".to_owned(), v.clone()))
            .collect(),
        Resource::Database(d) => vec![
            ("DatabaseName".to_owned(), d.database_name.clone()),
            ("Instance".to_owned(), d.parent.clone()),
        ],
        Resource::Project(p) => p
            .project_path
            .iter()
            .map(|path| ("ProjectPath".to_owned(), path.display().to_string()))
            .collect(),
    }
}

/// Settled states only lead back to `Running` through `Starting`.
fn mark_running(services: &Services, name: &str) {
    let notifications = &services.notifications;
    let result = notifications
        .publish_update(name, |s| {
            s.state = ResourceState::Starting;
            s.failure = None;
        })
        .and_then(|_| {
            notifications.publish_update(name, |s| {
                s.state = ResourceState::Running;
                s.started_at = Some(Local::now());
            })
        });
    if let Err(e) = result {
        warn!(resource = name, "dropping snapshot update: {e}");
    }
}

fn set_property(services: &Services, name: &str, key: &str, value: String) {
    let result = services.notifications.publish_update(name, |s| {
        s.properties.insert(key.to_owned(), value);
    });
    if let Err(e) = result {
        warn!(resource = name, "dropping snapshot update: {e}");
    }
}

/// A wired application: resources plus the services driving them.
pub struct App {
    model: Arc<AppModel>,
    services: Arc<Services>,
    packages: Vec<PackageBinding>,
    commands: CommandRegistry,
}

impl App {
    /// Provision every instance, wait for their health checks, and deploy
    /// the packages of the instances that became ready.
    ///
    /// Returns once every resource has settled. Failures are reported on
    /// the resource snapshots; see [`App::failed`].
    pub async fn start(&self, cancel: &CancellationToken) {
        info!("starting {} resources", self.model.len());
        self.services
            .eventing
            .publish(AppEvent::BeforeStart, &self.services, cancel)
            .await;

        let mut waits = JoinSet::new();
        for instance in self.model.instances() {
            if self.services.notifications.state(&instance.name) != Some(ResourceState::Running) {
                continue;
            }
            let services = Arc::clone(&self.services);
            let name = instance.name.clone();
            let cancel = cancel.clone();
            waits.spawn(async move {
                let key = check_key(&name);
                let settings = services.settings;
                match services
                    .health
                    .wait_healthy(&key, settings.health_interval, settings.health_timeout, &cancel)
                    .await
                {
                    Ok(()) => {
                        set_property(&services, &name, "Health", "Healthy".to_owned());
                        let event = AppEvent::ResourceReady { resource: name };
                        services.eventing.publish(event, &services, &cancel).await;
                    }
                    Err(e) => {
                        services.logs.logger(&name).error(&e.to_string());
                        set_property(&services, &name, "Health", format!("Unhealthy: {e}"));
                    }
                }
            });
        }
        while let Some(joined) = waits.join_next().await {
            if let Err(e) = joined {
                warn!("health wait task failed: {e}");
            }
        }
    }

    /// Stop the instances that asked for it, and the databases under them.
    pub async fn shutdown(&self) {
        for instance in self.model.instances() {
            let state = self.services.provisioner.shutdown(instance).await;
            if state != ResourceState::Stopped {
                continue;
            }
            for database in self.model.databases_of(&instance.name) {
                let notifications = &self.services.notifications;
                if !matches!(
                    notifications.state(&database.name),
                    Some(ResourceState::Running | ResourceState::FailedToStart)
                ) {
                    continue;
                }
                let stopped = notifications
                    .publish_update(&database.name, |s| s.state = ResourceState::Stopping)
                    .and_then(|_| {
                        notifications.publish_update(&database.name, |s| {
                            s.state = ResourceState::Stopped;
                            s.stopped_at = Some(Local::now());
                        })
                    });
                if let Err(e) = stopped {
                    warn!(resource = %database.name, "dropping snapshot update: {e}");
                }
            }
        }
    }

    pub fn model(&self) -> &AppModel {
        &self.model
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn packages(&self) -> &[PackageBinding] {
        &self.packages
    }

    /// Connection string of an instance or database, once its instance has started.
    pub fn connection_string(&self, name: &str) -> Option<String> {
        self.model
            .connection_string(name, &self.services.notifications)
    }

    pub fn snapshot(&self, name: &str) -> Option<ResourceSnapshot> {
        self.services.notifications.snapshot(name)
    }

    pub fn logs(&self, name: &str) -> Vec<LogLine> {
        self.services.logs.lines(name)
    }

    /// Resources whose last attempt failed, with the recorded failure.
    pub fn failed(&self) -> Vec<(String, Option<Failure>)> {
        self.model
            .iter()
            .filter_map(|r| {
                let snapshot = self.snapshot(r.name())?;
                (snapshot.state == ResourceState::FailedToStart)
                    .then(|| (r.name().to_owned(), snapshot.failure))
            })
            .collect()
    }

    pub fn commands_for(&self, resource: &str) -> Vec<ResourceCommand> {
        self.commands.for_resource(resource)
    }

    pub async fn execute_command(
        &self,
        resource: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecuteCommandResult, CoreError> {
        self.model
            .get(resource)
            .ok_or_else(|| CoreError::UnknownResource(resource.to_owned()))?;
        self.commands
            .execute(resource, name, &self.services, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::SQL_TARGET_PATH;
    use std::collections::HashMap;

    struct NoMetadata;

    impl ProjectEvaluator for NoMetadata {
        fn evaluate(
            &self,
            _project: &Path,
            _properties: &[&str],
        ) -> Result<HashMap<String, String>, CoreError> {
            Ok(HashMap::new())
        }
    }

    struct SqlTarget(&'static str);

    impl ProjectEvaluator for SqlTarget {
        fn evaluate(
            &self,
            _project: &Path,
            _properties: &[&str],
        ) -> Result<HashMap<String, String>, CoreError> {
            Ok(HashMap::from([(SQL_TARGET_PATH.to_owned(), self.0.to_owned())]))
        }
    }

    #[test]
    fn database_registers_under_instance() {
        let mut builder = AppBuilder::new();
        let instance = builder
            .add_instance("TestDb", InstanceOptions::default())
            .unwrap();
        let db = builder
            .add_database(&instance, "Database", Some("Database1"))
            .unwrap();
        assert_eq!(db.name(), "Database");

        let registered = builder.model().instance("TestDb").unwrap();
        assert_eq!(registered.databases()["Database"], "Database1");
        assert_eq!(builder.model().database("Database").unwrap().parent, "TestDb");
    }

    #[test]
    fn duplicate_database_leaves_registry_unchanged() {
        let mut builder = AppBuilder::new();
        let instance = builder
            .add_instance("TestDb", InstanceOptions::default())
            .unwrap();
        builder
            .add_database(&instance, "Database", Some("Database1"))
            .unwrap();
        let err = builder
            .add_database(&instance, "Database", Some("Other"))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateResource(_)));
        assert_eq!(
            builder.model().instance("TestDb").unwrap().databases()["Database"],
            "Database1"
        );
    }

    #[test]
    fn second_package_for_a_database_is_rejected() {
        let mut builder = AppBuilder::new();
        let instance = builder
            .add_instance("TestDb", InstanceOptions::default())
            .unwrap();
        let db = builder.add_database(&instance, "Database", None).unwrap();
        builder
            .with_dacpac(&db, "a.dacpac", DeployOptions::default())
            .unwrap();
        let err = builder
            .with_dacpac(&db, "b.dacpac", DeployOptions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
        assert_eq!(builder.packages().len(), 1);
    }

    #[test]
    fn reference_resolves_eagerly_and_records_target() {
        let mut builder = AppBuilder::new();
        let instance = builder
            .add_instance("TestDb", InstanceOptions::default())
            .unwrap();
        let db = builder.add_database(&instance, "Database", None).unwrap();
        let project = builder
            .add_sql_project(
                "Database1",
                Some(PathBuf::from("/src/Database1.sqlproj")),
                None,
            )
            .unwrap();

        let path = builder
            .with_reference(
                &project,
                &db,
                DeployOptions::default(),
                &SqlTarget("/out/Database1.dacpac"),
            )
            .unwrap();
        assert_eq!(path, PathBuf::from("/out/Database1.dacpac"));
        assert_eq!(builder.packages()[0].project.as_deref(), Some("Database1"));
        assert_eq!(
            builder.model().project("Database1").unwrap().target.as_deref(),
            Some("Database")
        );
    }

    #[test]
    fn unresolvable_reference_fails_registration() {
        let mut builder = AppBuilder::new();
        let instance = builder
            .add_instance("TestDb", InstanceOptions::default())
            .unwrap();
        let db = builder.add_database(&instance, "Database", None).unwrap();
        let project = builder.add_sql_project("Database1", None, None).unwrap();

        let err = builder
            .with_reference(&project, &db, DeployOptions::default(), &NoMetadata)
            .unwrap_err();
        assert!(matches!(err, CoreError::PackageNotFound { .. }));
        assert!(builder.packages().is_empty());
    }

    #[test]
    fn instance_options_can_be_adjusted() {
        let mut builder = AppBuilder::new();
        let instance = builder
            .add_instance("TestDb", InstanceOptions::default())
            .unwrap();
        builder
            .with_instance_options(&instance, |o| o.temporary = true)
            .unwrap();
        assert!(builder.model().instance("TestDb").unwrap().options.temporary);
    }
}
