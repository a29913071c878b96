use crate::deployer::{DeployBackend, DeployRequest, MessageSink};
use crate::engine::{EngineBackend, InstanceInfo};
use crate::RuntimeError;
use async_trait::async_trait;
use localdb_schema::InstanceOptions;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn poisoned(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::InvalidOutput {
        program: "mock".to_owned(),
        detail: format!("mutex poisoned: {e}"),
    }
}

#[derive(Debug, Clone)]
struct MockInstance {
    version: String,
    running: bool,
}

/// In-memory LocalDB engine.
///
/// Every call is recorded as `"<verb> <instance>"`; individual instances can
/// be told to fail on start.
#[derive(Default)]
pub struct MockEngine {
    instances: Mutex<HashMap<String, MockInstance>>,
    fail_start: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    start_delay: Mutex<Option<Duration>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `start` of `instance` fail.
    pub fn fail_start_for(&self, instance: &str) {
        if let Ok(mut set) = self.fail_start.lock() {
            set.insert(instance.to_owned());
        }
    }

    /// Delay `start` calls, so cancellation can be observed mid-call.
    pub fn set_start_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.start_delay.lock() {
            *d = Some(delay);
        }
    }

    /// Mark an instance stopped without going through the backend API.
    pub fn crash(&self, instance: &str) {
        if let Ok(mut map) = self.instances.lock() {
            if let Some(inst) = map.get_mut(instance) {
                inst.running = false;
            }
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, verb: &str, instance: &str) -> Result<(), RuntimeError> {
        self.calls
            .lock()
            .map_err(poisoned)?
            .push(format!("{verb} {instance}"));
        Ok(())
    }

    fn snapshot(&self, instance: &str) -> Result<InstanceInfo, RuntimeError> {
        let map = self.instances.lock().map_err(poisoned)?;
        Ok(match map.get(instance) {
            Some(inst) => InstanceInfo {
                name: instance.to_owned(),
                exists: true,
                running: inst.running,
                version: Some(inst.version.clone()),
                pipe_name: inst
                    .running
                    .then(|| format!(r"np:\\.\pipe\LOCALDB#MOCK\{instance}\tsql\query")),
            },
            None => InstanceInfo::missing(instance),
        })
    }
}

#[async_trait]
impl EngineBackend for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    async fn info(&self, instance: &str) -> Result<InstanceInfo, RuntimeError> {
        self.snapshot(instance)
    }

    async fn get_or_create(
        &self,
        instance: &str,
        options: &InstanceOptions,
        cancel: &CancellationToken,
    ) -> Result<InstanceInfo, RuntimeError> {
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        {
            let mut map = self.instances.lock().map_err(poisoned)?;
            if !map.contains_key(instance) {
                map.insert(
                    instance.to_owned(),
                    MockInstance {
                        version: options.version.clone().unwrap_or_else(|| "15.0.0.0".to_owned()),
                        running: false,
                    },
                );
                drop(map);
                self.record("create", instance)?;
            }
        }
        self.snapshot(instance)
    }

    async fn start(
        &self,
        instance: &str,
        cancel: &CancellationToken,
    ) -> Result<InstanceInfo, RuntimeError> {
        self.record("start", instance)?;
        let delay = *self.start_delay.lock().map_err(poisoned)?;
        if let Some(delay) = delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            }
        }
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        if self.fail_start.lock().map_err(poisoned)?.contains(instance) {
            return Err(RuntimeError::CommandFailed {
                program: "mock".to_owned(),
                status: "exit status: 1".to_owned(),
                stderr: format!("start of '{instance}' failed"),
            });
        }
        {
            let mut map = self.instances.lock().map_err(poisoned)?;
            let inst = map
                .get_mut(instance)
                .ok_or_else(|| RuntimeError::InstanceNotFound(instance.to_owned()))?;
            inst.running = true;
        }
        self.snapshot(instance)
    }

    async fn stop(&self, instance: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        self.record("stop", instance)?;
        let mut map = self.instances.lock().map_err(poisoned)?;
        let inst = map
            .get_mut(instance)
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance.to_owned()))?;
        inst.running = false;
        Ok(())
    }

    async fn delete(&self, instance: &str) -> Result<(), RuntimeError> {
        self.record("delete", instance)?;
        self.instances
            .lock()
            .map_err(poisoned)?
            .remove(instance)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance.to_owned()))
    }
}

/// Deployer that records requests instead of publishing them.
#[derive(Default)]
pub struct MockDeployer {
    requests: Mutex<Vec<DeployRequest>>,
    fail_with: Mutex<Option<String>>,
}

impl MockDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following deployment fail with `message`.
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut f) = self.fail_with.lock() {
            *f = Some(message.to_owned());
        }
    }

    pub fn clear_failure(&self) {
        if let Ok(mut f) = self.fail_with.lock() {
            *f = None;
        }
    }

    pub fn requests(&self) -> Vec<DeployRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DeployBackend for MockDeployer {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    async fn deploy(
        &self,
        request: &DeployRequest,
        cancel: &CancellationToken,
        on_message: MessageSink<'_>,
    ) -> Result<(), RuntimeError> {
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        self.requests.lock().map_err(poisoned)?.push(request.clone());
        on_message(&format!(
            "Publishing to database '{}'",
            request.database_name
        ));

        let failure = self.fail_with.lock().map_err(poisoned)?.clone();
        if let Some(message) = failure {
            return Err(RuntimeError::DeployFailed(message));
        }
        on_message("Successfully published database.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use localdb_schema::DeployOptions;
    use std::path::PathBuf;

    #[tokio::test]
    async fn mock_engine_lifecycle() {
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();

        assert!(!engine.info("TestDb").await.unwrap().exists);

        let info = engine
            .get_or_create("TestDb", &InstanceOptions::default(), &cancel)
            .await
            .unwrap();
        assert!(info.exists);
        assert!(!info.running);

        let info = engine.start("TestDb", &cancel).await.unwrap();
        assert!(info.running);
        assert!(info.pipe_name.is_some());

        // existing instance is reused
        engine
            .get_or_create("TestDb", &InstanceOptions::default(), &cancel)
            .await
            .unwrap();

        engine.stop("TestDb", Duration::from_secs(1)).await.unwrap();
        assert!(!engine.info("TestDb").await.unwrap().running);
        engine.delete("TestDb").await.unwrap();
        assert!(!engine.info("TestDb").await.unwrap().exists);

        assert_eq!(
            engine.calls(),
            vec!["create TestDb", "start TestDb", "stop TestDb", "delete TestDb"]
        );
    }

    #[tokio::test]
    async fn mock_engine_injected_failure() {
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();
        engine.fail_start_for("Broken");
        engine
            .get_or_create("Broken", &InstanceOptions::default(), &cancel)
            .await
            .unwrap();
        assert!(engine.start("Broken", &cancel).await.is_err());
        assert!(!engine.info("Broken").await.unwrap().running);
    }

    #[tokio::test]
    async fn mock_engine_start_observes_cancellation() {
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();
        engine
            .get_or_create("Slow", &InstanceOptions::default(), &cancel)
            .await
            .unwrap();
        engine.set_start_delay(Duration::from_secs(30));
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });
        let err = engine.start("Slow", &cancel).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
    }

    #[tokio::test]
    async fn mock_deployer_records_and_fails_on_demand() {
        let deployer = MockDeployer::new();
        let cancel = CancellationToken::new();
        let request = DeployRequest {
            package_path: PathBuf::from("db.dacpac"),
            connection_string: r"Data Source=(LocalDb)\A;Database=B".to_owned(),
            database_name: "B".to_owned(),
            upgrade_existing: true,
            options: DeployOptions::default(),
        };

        let messages = Mutex::new(Vec::new());
        let sink = |m: &str| messages.lock().unwrap().push(m.to_owned());
        deployer.deploy(&request, &cancel, &sink).await.unwrap();
        assert_eq!(messages.lock().unwrap().len(), 2);

        deployer.fail_with("schema conflict");
        let err = deployer.deploy(&request, &cancel, &sink).await.unwrap_err();
        assert!(err.to_string().contains("schema conflict"));
        assert_eq!(deployer.requests().len(), 2);
    }
}
