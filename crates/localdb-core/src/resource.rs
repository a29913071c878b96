use crate::notify::ResourceNotificationService;
use crate::CoreError;
use localdb_schema::InstanceOptions;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Address of a LocalDB instance, optionally narrowed to one database.
///
/// Derived from resource names on demand and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    instance: String,
    database: Option<String>,
}

impl ConnectionDescriptor {
    pub fn for_instance(instance: &str) -> Self {
        Self {
            instance: instance.to_owned(),
            database: None,
        }
    }

    #[must_use]
    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_owned());
        self
    }

    /// Server part of the descriptor, e.g. `(LocalDb)\TestDb`.
    pub fn data_source(&self) -> String {
        format!(r"(LocalDb)\{}", self.instance)
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data Source={}", self.data_source())?;
        if let Some(db) = &self.database {
            write!(f, ";Database={db}")?;
        }
        Ok(())
    }
}

/// A resource that can be reached through a connection string.
pub trait ResourceWithConnectionString {
    fn connection_descriptor(&self) -> ConnectionDescriptor;

    /// Name of the instance whose start makes the connection string valid.
    fn owning_instance(&self) -> &str;

    /// The connection string, or `None` while the owning instance has never
    /// reached `Running` in this process.
    fn connection_string(&self, notifications: &ResourceNotificationService) -> Option<String> {
        notifications
            .has_started(self.owning_instance())
            .then(|| self.connection_descriptor().to_string())
    }
}

/// A named LocalDB instance and the databases registered under it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceResource {
    pub name: String,
    pub options: InstanceOptions,
    databases: BTreeMap<String, String>,
}

impl InstanceResource {
    pub fn new(name: &str, options: InstanceOptions) -> Self {
        Self {
            name: name.to_owned(),
            options,
            databases: BTreeMap::new(),
        }
    }

    /// Logical resource name to database name.
    pub fn databases(&self) -> &BTreeMap<String, String> {
        &self.databases
    }

    /// Register a database. Returns `false`, leaving the registry untouched,
    /// when `name` is already present.
    pub fn add_database(&mut self, name: &str, database_name: &str) -> bool {
        if self.databases.contains_key(name) {
            return false;
        }
        self.databases
            .insert(name.to_owned(), database_name.to_owned());
        true
    }
}

impl ResourceWithConnectionString for InstanceResource {
    fn connection_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::for_instance(&self.name)
    }

    fn owning_instance(&self) -> &str {
        &self.name
    }
}

/// A database hosted by exactly one instance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DatabaseResource {
    pub name: String,
    pub database_name: String,
    /// Name of the parent [`InstanceResource`].
    pub parent: String,
}

impl DatabaseResource {
    /// `database_name` defaults to `name` when not given.
    pub fn new(name: &str, database_name: Option<&str>, parent: &str) -> Self {
        Self {
            name: name.to_owned(),
            database_name: database_name.unwrap_or(name).to_owned(),
            parent: parent.to_owned(),
        }
    }
}

impl ResourceWithConnectionString for DatabaseResource {
    fn connection_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::for_instance(&self.parent).with_database(&self.database_name)
    }

    fn owning_instance(&self) -> &str {
        &self.parent
    }
}

/// A SQL Server database project producing a `.dacpac`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SqlProjectResource {
    pub name: String,
    /// Project file evaluated for its build output.
    pub project_path: Option<PathBuf>,
    /// Explicitly known package location.
    pub dacpac: Option<PathBuf>,
    /// Database the package is deployed to, once referenced.
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Instance(InstanceResource),
    Database(DatabaseResource),
    Project(SqlProjectResource),
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::Instance(r) => &r.name,
            Resource::Database(r) => &r.name,
            Resource::Project(r) => &r.name,
        }
    }

    /// Resource type shown next to the state.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Resource::Instance(_) => "LocalDbInstance",
            Resource::Database(_) => "LocalDbDatabase",
            Resource::Project(_) => "SqlProject",
        }
    }

    pub fn connection_string(&self, notifications: &ResourceNotificationService) -> Option<String> {
        match self {
            Resource::Instance(r) => r.connection_string(notifications),
            Resource::Database(r) => r.connection_string(notifications),
            Resource::Project(_) => None,
        }
    }
}

/// Registry of every resource in the application, in registration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppModel {
    resources: Vec<Resource>,
}

impl AppModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: Resource) -> Result<(), CoreError> {
        if self.get(resource.name()).is_some() {
            return Err(CoreError::DuplicateResource(resource.name().to_owned()));
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn instance(&self, name: &str) -> Result<&InstanceResource, CoreError> {
        match self.get(name) {
            Some(Resource::Instance(r)) => Ok(r),
            Some(_) => Err(wrong_kind(name, "LocalDB instance")),
            None => Err(CoreError::UnknownResource(name.to_owned())),
        }
    }

    pub(crate) fn instance_mut(&mut self, name: &str) -> Result<&mut InstanceResource, CoreError> {
        match self.resources.iter_mut().find(|r| r.name() == name) {
            Some(Resource::Instance(r)) => Ok(r),
            Some(_) => Err(wrong_kind(name, "LocalDB instance")),
            None => Err(CoreError::UnknownResource(name.to_owned())),
        }
    }

    pub fn database(&self, name: &str) -> Result<&DatabaseResource, CoreError> {
        match self.get(name) {
            Some(Resource::Database(r)) => Ok(r),
            Some(_) => Err(wrong_kind(name, "LocalDB database")),
            None => Err(CoreError::UnknownResource(name.to_owned())),
        }
    }

    pub fn project(&self, name: &str) -> Result<&SqlProjectResource, CoreError> {
        match self.get(name) {
            Some(Resource::Project(r)) => Ok(r),
            Some(_) => Err(wrong_kind(name, "SQL project")),
            None => Err(CoreError::UnknownResource(name.to_owned())),
        }
    }

    pub(crate) fn project_mut(&mut self, name: &str) -> Result<&mut SqlProjectResource, CoreError> {
        match self.resources.iter_mut().find(|r| r.name() == name) {
            Some(Resource::Project(r)) => Ok(r),
            Some(_) => Err(wrong_kind(name, "SQL project")),
            None => Err(CoreError::UnknownResource(name.to_owned())),
        }
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceResource> {
        self.resources.iter().filter_map(|r| match r {
            Resource::Instance(i) => Some(i),
            _ => None,
        })
    }

    pub fn databases(&self) -> impl Iterator<Item = &DatabaseResource> {
        self.resources.iter().filter_map(|r| match r {
            Resource::Database(d) => Some(d),
            _ => None,
        })
    }

    /// Databases whose parent is `instance`.
    pub fn databases_of<'a>(
        &'a self,
        instance: &'a str,
    ) -> impl Iterator<Item = &'a DatabaseResource> + 'a {
        self.databases().filter(move |d| d.parent == instance)
    }

    pub fn connection_string(
        &self,
        name: &str,
        notifications: &ResourceNotificationService,
    ) -> Option<String> {
        self.get(name)?.connection_string(notifications)
    }
}

fn wrong_kind(name: &str, expected: &'static str) -> CoreError {
    CoreError::WrongResourceKind {
        name: name.to_owned(),
        expected,
    }
}
