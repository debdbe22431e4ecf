//! # Component Registry
//!
//! Runtime bookkeeping for named UI modules. A module announces itself with
//! [`ComponentRegistry::register`], naming the modules it depends on; the
//! registry waits for every dependency to reach `loaded` before the module
//! itself does, so `loaded` always follows the `loaded` transition of each
//! transitive dependency.
//!
//! ```text
//!   register("wb-card", deps=["wb-button"])
//!        │
//!        ├── wait_for_component("wb-button") ──▶ watch channel ──▶ loaded
//!        │
//!        └── record: pending ──▶ loaded  (or failed, with the dependency error)
//! ```
//!
//! Consumers that need a module whose code is not present yet call
//! [`ComponentRegistry::load_component`]: the registry resolves a source
//! location, runs the configured [`ModuleLoader`] under a timeout and then
//! waits for the fetched code to register itself. Concurrent loads and
//! registrations for the same name share one in-flight future.
//!
//! Waiting is wake-on-completion: each name has a `tokio::sync::watch`
//! channel carrying its status, and waiters race it against a timer.
//!
//! Every transition is appended to a bounded [`EventLog`] and echoed on the
//! [`EventBus`] as a `registryLog` notification.

pub mod elements;
pub mod health;
pub mod loader;
pub mod log;
pub mod record;

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RegistryConfig;
use crate::event::{Event, EventBus, EventType};
use crate::resolver::SymbolTable;

pub use elements::{ElementClass, ElementRegistry};
pub use health::{HealthCheckError, HealthMonitor, LivenessProbe};
pub use loader::{ModuleCatalog, ModuleInit, ModuleLoader};
pub use log::{EventLog, LogEntry, LogKind};
pub use record::{HealthStatus, Implementation, ModuleRecord, ModuleStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Timeout waiting for component: {name} ({timeout_ms}ms)")]
    DependencyTimeout { name: String, timeout_ms: u64 },
    #[error("Component {name} failed to load: {cause}")]
    DependencyFailed { name: String, cause: String },
    #[error("Failed to load component {name} from {location}: {message}")]
    LoadFailure {
        name: String,
        location: String,
        message: String,
    },
    #[error("Timeout loading component: {name} ({timeout_ms}ms)")]
    LoadTimeout { name: String, timeout_ms: u64 },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

type SharedLoad = Shared<BoxFuture<'static, RegistryResult<ModuleRecord>>>;
type StatusSender = Arc<watch::Sender<Option<ModuleStatus>>>;

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub status: ModuleStatus,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub health: HealthStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_components: usize,
    pub loaded_components: usize,
    pub failed_components: usize,
    pub healthy_components: usize,
    pub average_load_time: f64,
    pub uptime: u64,
    pub log_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub stats: RegistryStats,
    pub dependency_graph: BTreeMap<String, GraphNode>,
    pub recent_logs: Vec<LogEntry>,
    pub components: Vec<ModuleRecord>,
}

#[derive(Clone)]
pub struct ComponentRegistry {
    records: Arc<DashMap<String, ModuleRecord>>,
    watchers: Arc<DashMap<String, StatusSender>>,
    registrations: Arc<DashMap<String, SharedLoad>>,
    loading: Arc<DashMap<String, SharedLoad>>,
    log: Arc<EventLog>,
    elements: Arc<ElementRegistry>,
    event_bus: Arc<EventBus>,
    loader: Option<Arc<dyn ModuleLoader>>,
    symbols: Option<Arc<SymbolTable>>,
    liveness: Arc<RwLock<Option<Arc<dyn LivenessProbe>>>>,
    config: RegistryConfig,
}

impl ComponentRegistry {
    pub fn new(
        config: RegistryConfig,
        event_bus: Arc<EventBus>,
        elements: Arc<ElementRegistry>,
    ) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            watchers: Arc::new(DashMap::new()),
            registrations: Arc::new(DashMap::new()),
            loading: Arc::new(DashMap::new()),
            log: Arc::new(EventLog::new(config.log_capacity)),
            elements,
            event_bus,
            loader: None,
            symbols: None,
            liveness: Arc::new(RwLock::new(None)),
            config,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_symbols(mut self, symbols: Arc<SymbolTable>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    /// Installs the source of live-instance counts used by health sweeps.
    pub fn set_liveness_probe(&self, probe: Arc<dyn LivenessProbe>) {
        *self
            .liveness
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(probe);
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn elements(&self) -> &Arc<ElementRegistry> {
        &self.elements
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Registers a module once. Later calls for the same name, including
    /// calls made while the first is still waiting on dependencies, observe
    /// the first call's outcome.
    #[instrument(skip(self, implementation, dependencies, metadata))]
    pub async fn register<I, S>(
        &self,
        name: &str,
        implementation: Option<Implementation>,
        dependencies: I,
        metadata: Value,
    ) -> RegistryResult<ModuleRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dependencies: Vec<String> = dependencies.into_iter().map(Into::into).collect();
        self.log(
            LogKind::Info,
            &format!("Registering component: {}", name),
            json!({ "dependencies": dependencies, "metadata": metadata }),
        );

        let registration = match self.registrations.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                self.log(
                    LogKind::Warning,
                    &format!("Component {} already registered", name),
                    json!({}),
                );
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let registry = self.clone();
                let owned_name = name.to_string();
                let registration = async move {
                    registry
                        .load_with_dependencies(&owned_name, implementation, dependencies, metadata)
                        .await
                }
                .boxed()
                .shared();
                slot.insert(registration.clone());
                registration
            }
        };

        registration.await.inspect_err(|e| {
            self.log(
                LogKind::Error,
                &format!("Failed to register component {}", name),
                json!({ "error": e.to_string() }),
            );
        })
    }

    async fn load_with_dependencies(
        &self,
        name: &str,
        implementation: Option<Implementation>,
        dependencies: Vec<String>,
        metadata: Value,
    ) -> RegistryResult<ModuleRecord> {
        let started = Instant::now();
        self.begin_attempt(name, Some(dependencies.clone()), Some(metadata.clone()));

        if !dependencies.is_empty() {
            self.log(
                LogKind::Info,
                &format!("Waiting for dependencies: {}", dependencies.join(", ")),
                json!({ "component": name }),
            );
            let waits = dependencies
                .iter()
                .map(|dep| self.wait_for_component(dep, None));
            if let Err(e) = futures::future::try_join_all(waits).await {
                self.update_record(name, |record| {
                    record.status = ModuleStatus::Failed;
                    record.health = HealthStatus::Failed;
                    record.loaded_at = Utc::now();
                    record.load_time_ms = started.elapsed().as_millis() as u64;
                    record.error = Some(e.to_string());
                });
                self.log(
                    LogKind::Error,
                    &format!("Component {} failed to load", name),
                    json!({ "error": e.to_string() }),
                );
                return Err(e);
            }
        }

        if let Some(class) = implementation.as_ref().and_then(Implementation::element_class) {
            if self.elements.define(name, class.clone()) {
                self.log(
                    LogKind::Info,
                    &format!("Custom element {} defined", name),
                    json!({}),
                );
            }
        }

        let record = self
            .update_record(name, |record| {
                record.implementation = implementation;
                record.status = ModuleStatus::Loaded;
                record.health = HealthStatus::Healthy;
                record.loaded_at = Utc::now();
                record.load_time_ms = started.elapsed().as_millis() as u64;
                record.error = None;
            })
            .unwrap_or_else(|| ModuleRecord::pending(name, vec![], Value::Null));

        self.log(
            LogKind::Success,
            &format!("Component {} loaded successfully", name),
            json!({ "loadTime": record.load_time_ms }),
        );
        self.notify(
            EventType::ComponentLoaded,
            json!({ "name": name, "instance": record }),
        );

        Ok(record)
    }

    /// Resolves once `name` is `loaded`, rejects as soon as it is `failed`,
    /// or after `timeout` (default from config) elapses.
    pub async fn wait_for_component(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> RegistryResult<ModuleRecord> {
        let timeout = timeout.unwrap_or(self.config.wait_timeout);
        let settled = async {
            loop {
                let mut rx = self.status_channel(name).subscribe();
                let status = match rx
                    .wait_for(|s| matches!(s, Some(ModuleStatus::Loaded | ModuleStatus::Failed)))
                    .await
                {
                    Ok(status) => *status,
                    // channel dropped by reset(), subscribe to the new one
                    Err(_) => continue,
                };
                match (status, self.records.get(name).map(|r| r.clone())) {
                    (_, Some(record)) if record.status == ModuleStatus::Loaded => {
                        return Ok(record)
                    }
                    (_, Some(record)) if record.status == ModuleStatus::Failed => {
                        return Err(RegistryError::DependencyFailed {
                            name: name.to_string(),
                            cause: record.error.unwrap_or_else(|| "unknown error".to_string()),
                        })
                    }
                    _ => tokio::task::yield_now().await,
                }
            }
        };

        match tokio::time::timeout(timeout, settled).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Timed out waiting for {} after {:?}", name, timeout);
                Err(RegistryError::DependencyTimeout {
                    name: name.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    fn status_channel(&self, name: &str) -> StatusSender {
        self.watchers
            .entry(name.to_string())
            .or_insert_with(|| {
                let current = self.records.get(name).map(|r| r.status);
                Arc::new(watch::channel(current).0)
            })
            .clone()
    }

    /// Applies `update` to an existing record and wakes its waiters.
    fn update_record<F>(&self, name: &str, update: F) -> Option<ModuleRecord>
    where
        F: FnOnce(&mut ModuleRecord),
    {
        let record = {
            let mut record = self.records.get_mut(name)?;
            update(&mut record);
            record.clone()
        };
        self.status_channel(name).send_replace(Some(record.status));
        Some(record)
    }

    /// Starts a fresh attempt for `name`: inserts a pending record, or moves
    /// an unloaded one back to `pending` so waiters stop seeing an earlier
    /// failure.
    fn begin_attempt(
        &self,
        name: &str,
        dependencies: Option<Vec<String>>,
        metadata: Option<Value>,
    ) {
        match self.records.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(ModuleRecord::pending(
                    name,
                    dependencies.unwrap_or_default(),
                    metadata.unwrap_or(Value::Null),
                ));
                return;
            }
            Entry::Occupied(_) => {}
        }
        self.update_record(name, |record| {
            if let Some(dependencies) = dependencies {
                record.dependencies = dependencies;
            }
            if let Some(metadata) = metadata {
                record.metadata = metadata;
            }
            if record.status != ModuleStatus::Loaded {
                record.status = ModuleStatus::Pending;
                record.health = HealthStatus::Unknown;
                record.error = None;
            }
        });
    }

    /// The shared future of a `register` call for `name` that has not
    /// settled yet.
    fn pending_registration(&self, name: &str) -> Option<SharedLoad> {
        self.registrations
            .get(name)
            .map(|r| r.clone())
            .filter(|registration| registration.peek().is_none())
    }

    /// Moves a still-pending record to `failed`.
    fn fail_pending(&self, name: &str, cause: &RegistryError) {
        let still_pending = self
            .records
            .get(name)
            .map(|r| r.status == ModuleStatus::Pending)
            .unwrap_or(false);
        if still_pending {
            self.update_record(name, |record| {
                record.status = ModuleStatus::Failed;
                record.health = HealthStatus::Failed;
                record.error = Some(cause.to_string());
            });
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.records
            .get(name)
            .map(|r| r.status == ModuleStatus::Loaded)
            .unwrap_or(false)
    }

    pub fn is_healthy(&self, name: &str) -> bool {
        self.records
            .get(name)
            .map(|r| r.health == HealthStatus::Healthy)
            .unwrap_or(false)
    }

    /// `None` when the name was never registered.
    pub fn get_status(&self, name: &str) -> Option<ModuleStatus> {
        self.records.get(name).map(|r| r.status)
    }

    /// Status label as reported to log viewers, `not-registered` for unknown names.
    pub fn status_label(&self, name: &str) -> String {
        self.get_status(name)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "not-registered".to_string())
    }

    pub fn get_record(&self, name: &str) -> Option<ModuleRecord> {
        self.records.get(name).map(|r| r.clone())
    }

    pub fn get_dependencies(&self, name: &str) -> Vec<String> {
        self.records
            .get(name)
            .map(|r| r.dependencies.clone())
            .unwrap_or_default()
    }

    pub fn get_all_components(&self) -> Vec<ModuleRecord> {
        let mut records: Vec<ModuleRecord> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub fn get_component_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Dependencies of `name` that are not yet defined as elements.
    pub fn get_unloaded_dependencies(&self, name: &str) -> Vec<String> {
        self.get_dependencies(name)
            .into_iter()
            .filter(|dep| !self.elements.is_defined(dep))
            .collect()
    }

    pub fn get_dependents(&self, name: &str) -> Vec<String> {
        let mut dependents: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.dependencies.iter().any(|d| d == name))
            .map(|r| r.key().clone())
            .collect();
        dependents.sort();
        dependents
    }

    pub fn get_dependency_graph(&self) -> BTreeMap<String, GraphNode> {
        self.get_all_components()
            .into_iter()
            .map(|record| {
                let node = GraphNode {
                    status: record.status,
                    dependents: self.get_dependents(&record.name),
                    dependencies: record.dependencies,
                    health: record.health,
                };
                (record.name, node)
            })
            .collect()
    }

    pub fn get_stats(&self) -> RegistryStats {
        let records = self.get_all_components();
        let total = records.len();
        let average_load_time = if total == 0 {
            0.0
        } else {
            records.iter().map(|r| r.load_time_ms as f64).sum::<f64>() / total as f64
        };
        RegistryStats {
            total_components: total,
            loaded_components: records.iter().filter(|r| r.is_loaded()).count(),
            failed_components: records
                .iter()
                .filter(|r| r.status == ModuleStatus::Failed)
                .count(),
            healthy_components: records
                .iter()
                .filter(|r| r.health == HealthStatus::Healthy)
                .count(),
            average_load_time,
            uptime: self.log.uptime_ms(),
            log_entries: self.log.len(),
        }
    }

    pub fn generate_health_report(&self) -> HealthReport {
        HealthReport {
            timestamp: Utc::now(),
            stats: self.get_stats(),
            dependency_graph: self.get_dependency_graph(),
            recent_logs: self.log.recent(self.config.report_log_entries),
            components: self.get_all_components(),
        }
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.log.entries()
    }

    /// Appends to the event log, mirrors it to tracing and publishes a
    /// `registryLog` notification.
    pub fn log(&self, kind: LogKind, message: &str, details: Value) -> LogEntry {
        match kind {
            LogKind::Info => info!(details = %details, "Registry: {}", message),
            LogKind::Success => info!(details = %details, "Registry [SUCCESS]: {}", message),
            LogKind::Warning => warn!(details = %details, "Registry: {}", message),
            LogKind::Error => error!(details = %details, "Registry: {}", message),
        }
        let entry = self.log.append(kind, message, details);
        self.notify(
            EventType::RegistryLog,
            serde_json::to_value(&entry).unwrap_or(Value::Null),
        );
        entry
    }

    fn notify(&self, event_type: EventType, detail: Value) {
        let mut parameters = match detail {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("detail".to_string(), other);
                map
            }
        };
        parameters.insert("source".to_string(), json!("component-registry"));
        self.event_bus.publish(Event::new(event_type, parameters));
    }

    fn liveness_probe(&self) -> Option<Arc<dyn LivenessProbe>> {
        self.liveness
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clears records, in-flight work and the log. Element definitions are
    /// left alone; they belong to the element registry.
    pub fn reset(&self) {
        self.records.clear();
        self.registrations.clear();
        self.loading.clear();
        self.watchers.clear();
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(
            RegistryConfig::default(),
            Arc::new(EventBus::new(64)),
            Arc::new(ElementRegistry::new()),
        )
    }

    #[tokio::test]
    async fn test_register_without_dependencies() {
        let registry = registry();
        let record = registry
            .register("wb-button", None, Vec::<String>::new(), json!({}))
            .await
            .unwrap();
        assert_eq!(record.status, ModuleStatus::Loaded);
        assert!(registry.is_loaded("wb-button"));
        assert!(registry.is_healthy("wb-button"));
        assert_eq!(registry.status_label("nope"), "not-registered");
    }

    #[tokio::test]
    async fn test_duplicate_registration_shares_result() {
        let registry = registry();
        let first = registry
            .register("wb-x", None, Vec::<String>::new(), json!({"v": 1}))
            .await
            .unwrap();
        let second = registry
            .register("wb-x", None, Vec::<String>::new(), json!({"v": 2}))
            .await
            .unwrap();
        assert_eq!(first.loaded_at, second.loaded_at);
        assert_eq!(second.metadata, json!({"v": 1}));
        assert_eq!(registry.get_component_names(), vec!["wb-x"]);
        assert!(registry
            .log_entries()
            .iter()
            .any(|e| e.kind == LogKind::Warning));
    }

    #[tokio::test]
    async fn test_registration_waits_for_dependency() {
        let registry = registry();
        let waiting = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .register("wb-card", None, ["wb-button"], json!({}))
                    .await
            })
        };
        sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.get_status("wb-card"), Some(ModuleStatus::Pending));

        let button = registry
            .register("wb-button", None, Vec::<String>::new(), json!({}))
            .await
            .unwrap();
        let card = waiting.await.unwrap().unwrap();
        assert!(card.loaded_at >= button.loaded_at);
        assert_eq!(registry.get_dependents("wb-button"), vec!["wb-card"]);
    }

    #[tokio::test]
    async fn test_pending_record_is_not_healthy() {
        let registry = registry();
        let waiting = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .register("wb-card", None, ["wb-button"], json!({}))
                    .await
            })
        };
        sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.get_status("wb-card"), Some(ModuleStatus::Pending));
        assert!(!registry.is_healthy("wb-card"));
        assert_eq!(registry.get_stats().healthy_components, 0);
        assert_eq!(
            registry.get_record("wb-card").unwrap().health,
            HealthStatus::Unknown
        );

        registry
            .register("wb-button", None, Vec::<String>::new(), json!({}))
            .await
            .unwrap();
        waiting.await.unwrap().unwrap();
        assert!(registry.is_healthy("wb-card"));
        assert_eq!(registry.get_stats().healthy_components, 2);
    }

    #[tokio::test]
    async fn test_dependency_timeout_marks_failed() {
        let mut config = RegistryConfig::default();
        config.wait_timeout = Duration::from_millis(100);
        let registry = ComponentRegistry::new(
            config,
            Arc::new(EventBus::new(16)),
            Arc::new(ElementRegistry::new()),
        );
        let result = registry
            .register("wb-card", None, ["wb-ghost"], json!({}))
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::DependencyTimeout { ref name, .. }) if name == "wb-ghost"
        ));
        let record = registry.get_record("wb-card").unwrap();
        assert_eq!(record.status, ModuleStatus::Failed);
        assert_eq!(record.health, HealthStatus::Failed);
        assert!(record.error.unwrap().contains("wb-ghost"));
    }

    #[tokio::test]
    async fn test_wait_rejects_immediately_on_failed() {
        let mut config = RegistryConfig::default();
        config.wait_timeout = Duration::from_millis(50);
        let registry = ComponentRegistry::new(
            config,
            Arc::new(EventBus::new(16)),
            Arc::new(ElementRegistry::new()),
        );
        let _ = registry.register("wb-broken", None, ["wb-ghost"], json!({})).await;

        let started = Instant::now();
        let result = registry
            .wait_for_component("wb-broken", Some(Duration::from_secs(5)))
            .await;
        assert!(matches!(result, Err(RegistryError::DependencyFailed { .. })));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_times_out_for_missing() {
        let registry = registry();
        let started = Instant::now();
        let result = registry
            .wait_for_component("missing", Some(Duration::from_millis(200)))
            .await;
        let elapsed = started.elapsed();
        assert!(matches!(result, Err(RegistryError::DependencyTimeout { .. })));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_element_implementation_is_defined_once() {
        let registry = registry();
        registry
            .register(
                "wb-chip",
                Some(Implementation::Element(ElementClass::plain("span"))),
                Vec::<String>::new(),
                json!({}),
            )
            .await
            .unwrap();
        assert!(registry.elements().is_defined("wb-chip"));
        assert!(registry.get_record("wb-chip").unwrap().is_element());
    }

    #[tokio::test]
    async fn test_component_loaded_notification() {
        let registry = registry();
        let mut rx = registry.event_bus().subscribe();
        registry
            .register("wb-tab", None, Vec::<String>::new(), json!({}))
            .await
            .unwrap();
        let events = rx.drain();
        let loaded = events
            .iter()
            .find(|e| e.event_type == EventType::ComponentLoaded)
            .unwrap();
        assert_eq!(loaded.parameter("name"), Some(&json!("wb-tab")));
        assert!(events
            .iter()
            .any(|e| e.event_type == EventType::RegistryLog));
    }

    #[tokio::test]
    async fn test_stats_and_graph() {
        let registry = registry();
        assert_eq!(registry.get_stats().average_load_time, 0.0);
        registry
            .register("a", None, Vec::<String>::new(), json!({}))
            .await
            .unwrap();
        registry.register("b", None, ["a"], json!({})).await.unwrap();

        let stats = registry.get_stats();
        assert_eq!(stats.total_components, 2);
        assert_eq!(stats.loaded_components, 2);
        assert_eq!(stats.failed_components, 0);

        let graph = registry.get_dependency_graph();
        assert_eq!(graph["a"].dependents, vec!["b"]);
        assert_eq!(graph["b"].dependencies, vec!["a"]);

        let report = registry.generate_health_report();
        assert_eq!(report.components.len(), 2);
        assert!(!report.recent_logs.is_empty());
    }

    #[tokio::test]
    async fn test_unloaded_dependencies_reflect_element_definitions() {
        let registry = registry();
        let pending = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .register("wb-form", None, ["wb-input", "wb-label"], json!({}))
                    .await
            })
        };
        sleep(Duration::from_millis(20)).await;
        registry
            .elements()
            .define("wb-input", ElementClass::plain("input"));
        assert_eq!(registry.get_unloaded_dependencies("wb-form"), vec!["wb-label"]);
        pending.abort();
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let registry = registry();
        registry
            .register("a", None, Vec::<String>::new(), json!({}))
            .await
            .unwrap();
        registry.reset();
        assert!(registry.get_all_components().is_empty());
        assert!(registry.log_entries().is_empty());
        registry
            .register("a", None, Vec::<String>::new(), json!({}))
            .await
            .unwrap();
        assert!(registry.is_loaded("a"));
    }
}
