use std::sync::Arc;

use tracing::{debug, info};

use crate::config::SystemConfig;
use crate::event::EventBus;
use crate::factory::{ComponentFactory, Document, HandlerTable};
use crate::fetch::DocumentFetcher;
use crate::registry::{ComponentRegistry, ElementRegistry, HealthMonitor, ModuleLoader};
use crate::resolver::SymbolTable;
use crate::InternalResult;

/// Owns one of each shared collaborator and wires them together: the
/// factory is installed as the registry's liveness probe, and both sides
/// publish to the same event bus.
pub struct System {
    event_bus: Arc<EventBus>,
    elements: Arc<ElementRegistry>,
    document: Arc<Document>,
    symbols: Arc<SymbolTable>,
    registry: ComponentRegistry,
    factory: ComponentFactory,
    monitor: HealthMonitor,
    config: SystemConfig,
}

impl System {
    pub fn new(config: &SystemConfig, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let elements = Arc::new(ElementRegistry::new());
        let document = Arc::new(Document::new());
        let symbols = Arc::new(SymbolTable::new());

        let registry = ComponentRegistry::new(
            config.registry.clone(),
            event_bus.clone(),
            elements.clone(),
        )
        .with_symbols(symbols.clone());
        let factory = ComponentFactory::new(
            config.factory.clone(),
            fetcher,
            document.clone(),
            elements.clone(),
            event_bus.clone(),
        )
        .with_symbols(symbols.clone());
        registry.set_liveness_probe(Arc::new(factory.clone()));

        Self {
            event_bus,
            elements,
            document,
            symbols,
            monitor: HealthMonitor::new(registry.clone()),
            registry,
            factory,
            config: config.clone(),
        }
    }

    /// Installs the loader used by `load_component`. The registry is rebuilt
    /// around the same shared state, so call this before `start`.
    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.registry = self.registry.clone().with_loader(loader);
        self.monitor = HealthMonitor::new(self.registry.clone());
        self
    }

    pub fn with_handlers(mut self, handlers: Arc<HandlerTable>) -> Self {
        self.factory = self.factory.clone().with_handlers(handlers);
        self.registry
            .set_liveness_probe(Arc::new(self.factory.clone()));
        self
    }

    /// Starts health monitoring when enabled.
    pub async fn start(&self) -> InternalResult<()> {
        if self.config.registry.health_enabled {
            self.monitor.start().await;
            info!(
                "Health monitoring started ({:?})",
                self.config.registry.health_interval
            );
        } else {
            debug!("Health monitoring disabled");
        }
        Ok(())
    }

    pub async fn shutdown(&self) -> InternalResult<()> {
        self.monitor.stop().await;
        info!("System shut down");
        Ok(())
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn elements(&self) -> &Arc<ElementRegistry> {
        &self.elements
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn factory(&self) -> &ComponentFactory {
        &self.factory
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Test hook: clears registry records, definitions, instances and the
    /// document.
    pub fn reset(&self) {
        self.factory.reset();
        self.registry.reset();
        self.document.clear();
    }
}
