//! # Component Factory
//!
//! Holds component definitions and turns them into live [`Instance`]s.
//!
//! ```text
//!   create("badge", options)
//!        │
//!        ├── definition lookup ── unknown ──▶ None (logged)
//!        ├── dependency definitions ── candidate paths via DocumentFetcher
//!        ├── TemplateCompiler ──▶ element tree + markup
//!        ├── style::synthesize ──▶ scoped stylesheet in the Document
//!        ├── ListenerTable::wire ──▶ handlers bound to root / selectors
//!        └── `ready` dispatched, instance stored in the live table
//! ```
//!
//! Definitions are immutable once registered and shared between instances.
//! The factory also serves as the registry's [`LivenessProbe`]: the number
//! of live instances per definition stands in for scanning a rendered page.

pub mod actions;
pub mod definition;
pub mod dom;
pub mod instance;
pub mod style;
pub mod template;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::FactoryConfig;
use crate::event::EventBus;
use crate::fetch::DocumentFetcher;
use crate::registry::{ElementRegistry, HealthCheckError, LivenessProbe};
use crate::resolver::SymbolTable;

pub use actions::{CustomHandler, HandlerTable, Occurrence};
pub use definition::{Action, Definition, TemplateNode};
pub use dom::{Document, Element, Node, Selector};
pub use instance::{CreateOptions, Instance, InstanceStatus};

use instance::InstanceScope;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactoryError {
    #[error("Definition missing name property")]
    MalformedDefinition,
    #[error("Component definition not found: {name}")]
    DefinitionNotFound { name: String },
    #[error("Invalid definition {name}: {message}")]
    InvalidDefinition { name: String, message: String },
}

pub type FactoryResult<T> = Result<T, FactoryError>;

type SharedResolve = Shared<BoxFuture<'static, bool>>;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    components: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    path: String,
}

#[derive(Clone)]
pub struct ComponentFactory {
    definitions: Arc<DashMap<String, Arc<Definition>>>,
    resolving: Arc<DashMap<String, SharedResolve>>,
    scope: Arc<InstanceScope>,
    fetcher: Arc<dyn DocumentFetcher>,
    symbols: Option<Arc<SymbolTable>>,
    config: FactoryConfig,
}

impl ComponentFactory {
    pub fn new(
        config: FactoryConfig,
        fetcher: Arc<dyn DocumentFetcher>,
        document: Arc<Document>,
        elements: Arc<ElementRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            definitions: Arc::new(DashMap::new()),
            resolving: Arc::new(DashMap::new()),
            scope: Arc::new(InstanceScope {
                document,
                elements,
                handlers: Arc::new(HandlerTable::new()),
                event_bus,
                live: Arc::new(DashMap::new()),
            }),
            fetcher,
            symbols: None,
            config,
        }
    }

    /// Replaces the table consulted by `custom` actions. Only instances
    /// created afterwards see the new table.
    pub fn with_handlers(mut self, handlers: Arc<HandlerTable>) -> Self {
        let scope = &self.scope;
        self.scope = Arc::new(InstanceScope {
            document: scope.document.clone(),
            elements: scope.elements.clone(),
            handlers,
            event_bus: scope.event_bus.clone(),
            live: scope.live.clone(),
        });
        self
    }

    pub fn with_symbols(mut self, symbols: Arc<SymbolTable>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn handlers(&self) -> &Arc<HandlerTable> {
        &self.scope.handlers
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.scope.document
    }

    /// Registers a definition document, flat or nested.
    pub fn register(&self, document: Value) -> FactoryResult<Arc<Definition>> {
        let definition = Definition::from_value(document)?;
        Ok(self.register_definition(definition))
    }

    pub fn register_definition(&self, definition: Definition) -> Arc<Definition> {
        let definition = Arc::new(definition);
        debug!("Registered definition: {}", definition.name);
        self.definitions
            .insert(definition.name.clone(), definition.clone());
        definition
    }

    pub fn definition(&self, name: &str) -> Option<Arc<Definition>> {
        self.definitions.get(name).map(|d| d.clone())
    }

    pub fn has_definition(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn definition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.iter().map(|d| d.key().clone()).collect();
        names.sort();
        names
    }

    /// Creates an instance of `name`. Unknown names are logged and yield
    /// `None`; dependency definitions that cannot be found are logged and
    /// skipped.
    #[instrument(skip(self, options))]
    pub async fn create(&self, name: &str, options: CreateOptions) -> Option<Instance> {
        let Some(definition) = self.definition(name) else {
            error!(
                "{}",
                FactoryError::DefinitionNotFound {
                    name: name.to_string()
                }
            );
            return None;
        };

        let instance = Instance::new(definition.clone(), options, self.scope.clone());
        for dep in &definition.dependencies {
            if self.has_definition(dep) {
                continue;
            }
            if !self.resolve_dependency(dep).await {
                warn!("Failed to load dependency: {}", dep);
            }
        }

        instance.initialize();
        self.scope
            .live
            .insert(instance.id().to_string(), instance.clone());
        info!("Created {} ({})", instance.id(), name);
        Some(instance)
    }

    /// Loads the definition for `dep` from the first candidate location
    /// that serves one. Concurrent calls for the same name share one attempt.
    pub async fn resolve_dependency(&self, dep: &str) -> bool {
        let attempt = match self.resolving.entry(dep.to_string()) {
            Entry::Occupied(in_flight) => in_flight.get().clone(),
            Entry::Vacant(slot) => {
                let factory = self.clone();
                let owned = dep.to_string();
                let attempt = async move { factory.try_candidates(&owned).await }
                    .boxed()
                    .shared();
                slot.insert(attempt.clone());
                attempt
            }
        };
        let loaded = attempt.clone().await;
        self.resolving
            .remove_if(dep, |_, in_flight| in_flight.ptr_eq(&attempt));
        loaded
    }

    async fn try_candidates(&self, dep: &str) -> bool {
        for path in self.dependency_candidates(dep) {
            if self.load_definition(&path).await.is_some() {
                info!("Loaded dependency: {} from {}", dep, path);
                return true;
            }
            debug!("Dependency {} not found at {}", dep, path);
        }
        false
    }

    /// Locations tried for a dependency's definition, in order.
    pub fn dependency_candidates(&self, dep: &str) -> Vec<String> {
        let symbol_or = |symbol: String, fallback: String| match &self.symbols {
            Some(symbols) => symbols.resolve(&symbol),
            None => fallback,
        };
        vec![
            format!("../{0}/{0}.json", dep),
            format!("../{0}/{0}-data-driven.json", dep),
            symbol_or(
                format!("wb.{}.config", dep),
                format!("/components/{0}/{0}.json", dep),
            ),
            symbol_or(
                format!("wb.{}.data-config", dep),
                format!("/components/{0}/{0}-data-driven.json", dep),
            ),
        ]
    }

    /// Fetches and registers a definition document. Every failure is logged
    /// and reported as `None`.
    #[instrument(skip(self))]
    pub async fn load_definition(&self, path: &str) -> Option<Arc<Definition>> {
        let response = match self.fetcher.fetch(path).await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to load component definition: {}: {}", path, e);
                return None;
            }
        };
        if !response.is_ok() {
            warn!(
                "Component definition not found: {} ({})",
                path, response.status
            );
            return None;
        }
        match Definition::from_json(&response.body) {
            Ok(definition) => Some(self.register_definition(definition)),
            Err(e) => {
                warn!("Failed to load component definition: {}: {}", path, e);
                None
            }
        }
    }

    /// Loads every definition listed in the configured manifest.
    pub async fn autoload(&self) -> usize {
        let config = self.config.clone();
        self.autoload_from(&config.manifest_path, &config.fallback_manifest_path)
            .await
    }

    /// Loads every definition listed in `{components:[{path}]}` at `primary`,
    /// or at `fallback` when `primary` is not served. Returns how many were
    /// registered.
    pub async fn autoload_from(&self, primary: &str, fallback: &str) -> usize {
        let mut body = None;
        for path in [primary, fallback] {
            match self.fetcher.fetch(path).await {
                Ok(response) if response.is_ok() => {
                    body = Some(response.body);
                    break;
                }
                Ok(response) => debug!("No manifest at {} ({})", path, response.status),
                Err(e) => debug!("No manifest at {}: {}", path, e),
            }
        }
        let Some(body) = body else {
            info!("No component manifest found, manual registration required");
            return 0;
        };
        let manifest: Manifest = match serde_json::from_str(&body) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Unreadable component manifest: {}", e);
                return 0;
            }
        };

        let mut loaded = 0;
        for entry in manifest.components {
            if self.load_definition(&entry.path).await.is_some() {
                loaded += 1;
            }
        }
        info!("Autoloaded {} component definitions", loaded);
        loaded
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.scope.live.iter().map(|i| i.clone()).collect()
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.scope.live.get(id).map(|i| i.clone())
    }

    /// Live instances backed by the definition `name`.
    pub fn live_count(&self, name: &str) -> usize {
        self.scope.live.iter().filter(|i| i.name() == name).count()
    }

    /// Destroys every live instance and forgets all definitions.
    pub fn reset(&self) {
        for instance in self.instances() {
            instance.destroy();
        }
        self.scope.live.clear();
        self.definitions.clear();
        self.resolving.clear();
    }
}

impl LivenessProbe for ComponentFactory {
    fn live_instances(&self, name: &str) -> Result<usize, HealthCheckError> {
        Ok(self.live_count(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchResponse, MemoryFetcher, MockDocumentFetcher};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn factory_with(fetcher: Arc<dyn DocumentFetcher>) -> ComponentFactory {
        ComponentFactory::new(
            FactoryConfig::default(),
            fetcher,
            Arc::new(Document::new()),
            Arc::new(ElementRegistry::new()),
            Arc::new(EventBus::new(64)),
        )
    }

    fn badge() -> Value {
        json!({
            "name": "badge",
            "template": {"structure": [{"tag": "span", "attributes": {"class": "b"}, "content": "{{label}}"}]},
            "defaults": {"data": {"label": "new"}}
        })
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let factory = factory_with(Arc::new(MemoryFetcher::new()));
        factory.register(badge()).unwrap();

        let instance = factory.create("badge", CreateOptions::default()).await.unwrap();
        assert_eq!(instance.markup(), r#"<span class="b">new</span>"#);
        instance.update_data(json!({"label": "hot"}));
        assert_eq!(instance.markup(), r#"<span class="b">hot</span>"#);
        assert_eq!(factory.live_count("badge"), 1);
        assert!(factory.instance(instance.id()).is_some());
    }

    #[tokio::test]
    async fn test_options_data_overrides_defaults() {
        let factory = factory_with(Arc::new(MemoryFetcher::new()));
        factory.register(badge()).unwrap();
        let instance = factory
            .create("badge", CreateOptions::with_data(json!({"label": "mine"})))
            .await
            .unwrap();
        assert_eq!(instance.markup(), r#"<span class="b">mine</span>"#);
    }

    #[tokio::test]
    async fn test_unknown_definition_is_none() {
        let factory = factory_with(Arc::new(MemoryFetcher::new()));
        assert!(factory.create("ghost", CreateOptions::default()).await.is_none());
    }

    #[test]
    fn test_register_without_name_fails() {
        let factory = factory_with(Arc::new(MemoryFetcher::new()));
        assert_eq!(
            factory.register(json!({"template": {}})).unwrap_err(),
            FactoryError::MalformedDefinition
        );
        let nested = factory
            .register(json!({"component": {"name": "wb-card"}}))
            .unwrap();
        assert_eq!(nested.name, "wb-card");
    }

    #[tokio::test]
    async fn test_dependency_candidates_are_tried_in_order() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(
            "/components/wb-icon/wb-icon.json",
            json!({"name": "wb-icon"}).to_string(),
        );
        let factory = factory_with(fetcher.clone());
        factory
            .register(json!({"name": "card", "dependencies": ["wb-icon", "wb-missing"]}))
            .unwrap();

        let instance = factory.create("card", CreateOptions::default()).await;
        assert!(instance.is_some());
        assert!(factory.has_definition("wb-icon"));
        assert_eq!(fetcher.requests_for("../wb-icon/wb-icon.json"), 1);
        assert_eq!(fetcher.requests_for("../wb-icon/wb-icon-data-driven.json"), 1);
        assert_eq!(fetcher.requests_for("/components/wb-icon/wb-icon-data-driven.json"), 0);
        // every candidate for the missing one, then creation goes on
        assert_eq!(fetcher.total_requests(), 3 + 4);

        // already known now
        factory.create("card", CreateOptions::default()).await.unwrap();
        assert_eq!(fetcher.requests_for("/components/wb-icon/wb-icon.json"), 1);
    }

    #[test]
    fn test_candidates_with_symbols() {
        let symbols = Arc::new(SymbolTable::with_symbols([(
            "wb.chip.config",
            "lib/chip/chip.json",
        )]));
        let factory = factory_with(Arc::new(MemoryFetcher::new())).with_symbols(symbols);
        assert_eq!(
            factory.dependency_candidates("chip"),
            vec![
                "../chip/chip.json",
                "../chip/chip-data-driven.json",
                "/lib/chip/chip.json",
                "wb.chip.data-config",
            ]
        );
    }

    #[tokio::test]
    async fn test_load_definition_failures_are_none() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("/bad.json", "{not json");
        fetcher.insert("/nameless.json", "{}");
        let factory = factory_with(fetcher);
        assert!(factory.load_definition("/missing.json").await.is_none());
        assert!(factory.load_definition("/bad.json").await.is_none());
        assert!(factory.load_definition("/nameless.json").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_error_is_none() {
        let mut fetcher = MockDocumentFetcher::new();
        fetcher.expect_fetch().returning(|path| {
            Err(FetchError::Http {
                path: path.to_string(),
                message: "connection refused".to_string(),
            })
        });
        let factory = factory_with(Arc::new(fetcher));
        assert!(factory.load_definition("/x.json").await.is_none());
    }

    #[tokio::test]
    async fn test_autoload_falls_back_to_parent_manifest() {
        let mut fetcher = MockDocumentFetcher::new();
        fetcher.expect_fetch().returning(|path| {
            Ok(match path {
                "../component-registry.json" => FetchResponse::ok(
                    json!({"components": [{"path": "/a.json"}, {"path": "/gone.json"}]})
                        .to_string(),
                ),
                "/a.json" => FetchResponse::ok(json!({"name": "a"}).to_string()),
                _ => FetchResponse::not_found(),
            })
        });
        let factory = factory_with(Arc::new(fetcher));
        assert_eq!(factory.autoload().await, 1);
        assert_eq!(factory.definition_names(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_autoload_without_manifest() {
        let factory = factory_with(Arc::new(MemoryFetcher::new()));
        assert_eq!(factory.autoload().await, 0);
    }

    #[tokio::test]
    async fn test_liveness_probe_counts_instances() {
        let factory = factory_with(Arc::new(MemoryFetcher::new()));
        factory.register(badge()).unwrap();
        let a = factory.create("badge", CreateOptions::default()).await.unwrap();
        factory.create("badge", CreateOptions::default()).await.unwrap();
        assert_eq!(factory.live_instances("badge"), Ok(2));
        a.destroy();
        assert_eq!(factory.live_instances("badge"), Ok(1));
        assert_eq!(factory.live_instances("other"), Ok(0));

        factory.reset();
        assert!(factory.instances().is_empty());
        assert!(factory.definition_names().is_empty());
        assert_eq!(factory.document().stylesheet_count(), 0);
    }
}
