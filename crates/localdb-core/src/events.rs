use crate::services::Services;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeStart,
    ConnectionStringAvailable,
    ResourceReady,
}

/// Lifecycle event published by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Raised once before any resource starts.
    BeforeStart,
    /// The connection string of `resource` can now be resolved.
    ConnectionStringAvailable { resource: String },
    /// `resource` passed its health check.
    ResourceReady { resource: String },
}

impl AppEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AppEvent::BeforeStart => EventKind::BeforeStart,
            AppEvent::ConnectionStringAvailable { .. } => EventKind::ConnectionStringAvailable,
            AppEvent::ResourceReady { .. } => EventKind::ResourceReady,
        }
    }

    pub fn resource(&self) -> Option<&str> {
        match self {
            AppEvent::BeforeStart => None,
            AppEvent::ConnectionStringAvailable { resource }
            | AppEvent::ResourceReady { resource } => Some(resource),
        }
    }
}

/// Everything a handler gets to work with.
#[derive(Clone)]
pub struct EventContext {
    pub event: AppEvent,
    pub services: Arc<Services>,
    pub cancel: CancellationToken,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Handler = Arc<dyn Fn(EventContext) -> HandlerFuture + Send + Sync>;

struct Subscription {
    kind: EventKind,
    resource: Option<String>,
    handler: Handler,
}

/// Publish/subscribe for lifecycle events.
///
/// Handlers run one after another in subscription order; `publish` returns
/// once the last one has finished.
#[derive(Default)]
pub struct Eventing {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Eventing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `handler` for every event of `kind`.
    pub fn subscribe<F, Fut>(&self, kind: EventKind, handler: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push(kind, None, handler);
    }

    /// Run `handler` for events of `kind` raised for `resource` only.
    pub fn subscribe_for<F, Fut>(&self, kind: EventKind, resource: &str, handler: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push(kind, Some(resource.to_owned()), handler);
    }

    fn push<F, Fut>(&self, kind: EventKind, resource: Option<String>, handler: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ctx| -> HandlerFuture { Box::pin(handler(ctx)) });
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.push(Subscription {
                kind,
                resource,
                handler,
            });
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .lock()
            .map(|subs| subs.iter().filter(|s| s.kind == kind).count())
            .unwrap_or(0)
    }

    pub async fn publish(
        &self,
        event: AppEvent,
        services: &Arc<Services>,
        cancel: &CancellationToken,
    ) {
        // Collect first: handlers may publish further events.
        let handlers: Vec<Handler> = match self.subscriptions.lock() {
            Ok(subs) => subs
                .iter()
                .filter(|s| s.kind == event.kind())
                .filter(|s| match (&s.resource, event.resource()) {
                    (Some(wanted), Some(actual)) => wanted == actual,
                    (Some(_), None) => false,
                    (None, _) => true,
                })
                .map(|s| Arc::clone(&s.handler))
                .collect(),
            Err(_) => Vec::new(),
        };

        debug!(event = ?event, handlers = handlers.len(), "publishing event");
        for handler in handlers {
            if cancel.is_cancelled() {
                break;
            }
            handler(EventContext {
                event: event.clone(),
                services: Arc::clone(services),
                cancel: cancel.clone(),
            })
            .await;
        }
    }
}
