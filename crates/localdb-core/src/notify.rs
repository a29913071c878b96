use crate::lifecycle::{validate_transition, ResourceState};
use crate::CoreError;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or unresolvable configuration, e.g. no connection string yet.
    Configuration,
    PackageNotFound,
    Provisioning,
    Deployment,
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Configuration => write!(f, "configuration"),
            FailureKind::PackageNotFound => write!(f, "package not found"),
            FailureKind::Provisioning => write!(f, "provisioning"),
            FailureKind::Deployment => write!(f, "deployment"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why the last attempt ended in `FailedToStart`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub resource_type: String,
    pub state: ResourceState,
    pub created_at: DateTime<Local>,
    pub started_at: Option<DateTime<Local>>,
    pub stopped_at: Option<DateTime<Local>>,
    pub properties: BTreeMap<String, String>,
    pub failure: Option<Failure>,
}

impl ResourceSnapshot {
    fn new(resource_type: &str, properties: Vec<(String, String)>) -> Self {
        Self {
            resource_type: resource_type.to_owned(),
            state: ResourceState::NotStarted,
            created_at: Local::now(),
            started_at: None,
            stopped_at: None,
            properties: properties.into_iter().collect(),
            failure: None,
        }
    }
}

/// A snapshot published for one resource.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    pub resource: String,
    pub snapshot: ResourceSnapshot,
}

/// Holds the current snapshot of every resource and broadcasts changes.
pub struct ResourceNotificationService {
    snapshots: Mutex<HashMap<String, ResourceSnapshot>>,
    events: broadcast::Sender<ResourceEvent>,
}

impl Default for ResourceNotificationService {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            snapshots: Mutex::new(HashMap::new()),
            events,
        }
    }
}

impl ResourceNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial `NotStarted` snapshot of a resource. Re-registering
    /// an existing resource keeps its current snapshot.
    pub fn register(&self, name: &str, resource_type: &str, properties: Vec<(String, String)>) {
        if let Ok(mut map) = self.snapshots.lock() {
            map.entry(name.to_owned())
                .or_insert_with(|| ResourceSnapshot::new(resource_type, properties));
        }
    }

    /// Apply `update` to the snapshot of `name` and broadcast the result.
    ///
    /// A state change that breaks the lifecycle is refused and the stored
    /// snapshot is left as it was.
    pub fn publish_update(
        &self,
        name: &str,
        update: impl FnOnce(&mut ResourceSnapshot),
    ) -> Result<ResourceSnapshot, CoreError> {
        let snapshot = {
            let mut map = self
                .snapshots
                .lock()
                .map_err(|e| CoreError::Configuration(format!("snapshot lock poisoned: {e}")))?;
            let current = map
                .get_mut(name)
                .ok_or_else(|| CoreError::UnknownResource(name.to_owned()))?;

            let mut next = current.clone();
            update(&mut next);
            if next.state != current.state {
                validate_transition(current.state, next.state)?;
            }
            *current = next.clone();
            next
        };

        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(ResourceEvent {
            resource: name.to_owned(),
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    pub fn snapshot(&self, name: &str) -> Option<ResourceSnapshot> {
        self.snapshots.lock().ok()?.get(name).cloned()
    }

    pub fn state(&self, name: &str) -> Option<ResourceState> {
        self.snapshot(name).map(|s| s.state)
    }

    /// Whether `name` has reached `Running` at least once.
    pub fn has_started(&self, name: &str) -> bool {
        self.snapshot(name).is_some_and(|s| s.started_at.is_some())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.events.subscribe()
    }

    /// Wait until the snapshot of `name` satisfies `predicate`.
    pub async fn wait_for(
        &self,
        name: &str,
        predicate: impl Fn(&ResourceSnapshot) -> bool,
        cancel: &CancellationToken,
    ) -> Result<ResourceSnapshot, CoreError> {
        // Subscribe before reading the current value so no update slips between.
        let mut rx = self.subscribe();
        let current = self
            .snapshot(name)
            .ok_or_else(|| CoreError::UnknownResource(name.to_owned()))?;
        if predicate(&current) {
            return Ok(current);
        }

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) if event.resource == name && predicate(&event.snapshot) => {
                        return Ok(event.snapshot);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Some(s) = self.snapshot(name).filter(|s| predicate(s)) {
                            return Ok(s);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(CoreError::Cancelled),
                },
                () = cancel.cancelled() => return Err(CoreError::Cancelled),
            }
        }
    }
}
