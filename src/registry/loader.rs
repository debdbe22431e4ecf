use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::fetch::{FetchError, FetchResult};
use crate::resolver::SymbolTable;

use super::{
    ComponentRegistry, ElementClass, Implementation, LogKind, ModuleRecord, ModuleStatus,
    RegistryError, RegistryResult,
};

/// Fetches and executes module code published at a location.
///
/// Executing a module is expected to end with the module calling
/// [`ComponentRegistry::register`] for its own name; the registry confirms
/// that separately, the loader only reports whether fetch and execution
/// succeeded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, name: &str, location: &str, registry: ComponentRegistry)
        -> FetchResult<()>;
}

/// Top-level code of a module. Receives the registry it should register with.
pub type ModuleInit = Arc<dyn Fn(ComponentRegistry) -> BoxFuture<'static, ()> + Send + Sync>;

/// Modules compiled into the host, published under locations.
///
/// Loading a location spawns its init future, the way a script tag runs its
/// top-level code after the fetch completes.
#[derive(Default)]
pub struct ModuleCatalog {
    modules: DashMap<String, ModuleInit>,
    loads: DashMap<String, usize>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, location: impl Into<String>, init: ModuleInit) {
        self.modules.insert(location.into(), init);
    }

    /// Publishes a module that registers itself as a plain element named `name`.
    pub fn publish_element(&self, location: impl Into<String>, name: &str, dependencies: &[&str]) {
        let name = name.to_string();
        let dependencies: Vec<String> = dependencies.iter().map(|d| d.to_string()).collect();
        self.publish(
            location,
            Arc::new(move |registry: ComponentRegistry| {
                let name = name.clone();
                let dependencies = dependencies.clone();
                async move {
                    let _ = registry
                        .register(
                            &name,
                            Some(Implementation::Element(ElementClass::plain("div"))),
                            dependencies,
                            Value::Null,
                        )
                        .await;
                }
                .boxed()
            }),
        );
    }

    /// How many times `location` was fetched.
    pub fn loads(&self, location: &str) -> usize {
        self.loads.get(location).map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl ModuleLoader for ModuleCatalog {
    async fn load(
        &self,
        name: &str,
        location: &str,
        registry: ComponentRegistry,
    ) -> FetchResult<()> {
        *self.loads.entry(location.to_string()).or_insert(0) += 1;
        let init = self
            .modules
            .get(location)
            .map(|init| init.clone())
            .ok_or_else(|| FetchError::Status {
                path: location.to_string(),
                status: 404,
            })?;
        debug!("Executing module {} from {}", name, location);
        tokio::spawn(init(registry));
        Ok(())
    }
}

impl ComponentRegistry {
    /// Where the code for `name` is published.
    pub fn resolve_location(&self, name: &str) -> String {
        match &self.symbols {
            Some(symbols) => symbols.resolve(&SymbolTable::module_symbol(name)),
            None => format!("/components/{}/{}.js", name, name),
        }
    }

    /// Loads the code for `name` unless it is already loaded. Concurrent
    /// calls for one name share a single fetch.
    #[instrument(skip(self))]
    pub async fn load_component(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> RegistryResult<ModuleRecord> {
        if let Some(record) = self.get_record(name).filter(ModuleRecord::is_loaded) {
            debug!("Component {} already loaded", name);
            return Ok(record);
        }

        if let Some(registration) = self.pending_registration(name) {
            debug!("Component {} is registering, waiting on it", name);
            return registration.await;
        }

        let load = match self.loading.entry(name.to_string()) {
            Entry::Occupied(in_flight) => {
                debug!("Component {} already loading, waiting", name);
                in_flight.get().clone()
            }
            Entry::Vacant(slot) => {
                let registry = self.clone();
                let owned_name = name.to_string();
                let timeout = timeout.unwrap_or(self.config.load_timeout);
                let load = async move { registry.perform_load(&owned_name, timeout).await }
                    .boxed()
                    .shared();
                slot.insert(load.clone());
                load
            }
        };

        let result = load.clone().await;
        self.loading
            .remove_if(name, |_, in_flight| in_flight.ptr_eq(&load));
        result
    }

    async fn perform_load(&self, name: &str, timeout: Duration) -> RegistryResult<ModuleRecord> {
        let location = self.resolve_location(name);
        self.log(
            LogKind::Info,
            &format!("Loading component {} from {}", name, location),
            json!({ "location": location }),
        );
        self.begin_attempt(name, None, None);

        let result = self.fetch_and_confirm(name, &location, timeout).await;
        if let Err(e) = &result {
            self.fail_pending(name, e);
        }
        result
    }

    async fn fetch_and_confirm(
        &self,
        name: &str,
        location: &str,
        timeout: Duration,
    ) -> RegistryResult<ModuleRecord> {
        let Some(loader) = self.loader.clone() else {
            let e = RegistryError::LoadFailure {
                name: name.to_string(),
                location: location.to_string(),
                message: "no module loader configured".to_string(),
            };
            self.log(LogKind::Error, &e.to_string(), json!({}));
            return Err(e);
        };

        match tokio::time::timeout(timeout, loader.load(name, location, self.clone())).await {
            Err(_) => {
                let e = RegistryError::LoadTimeout {
                    name: name.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                self.log(LogKind::Error, &e.to_string(), json!({ "location": location }));
                Err(e)
            }
            Ok(Err(fetch_error)) => {
                let e = RegistryError::LoadFailure {
                    name: name.to_string(),
                    location: location.to_string(),
                    message: format!("Failed to load component script: {}", fetch_error),
                };
                self.log(LogKind::Error, &e.to_string(), json!({}));
                Err(e)
            }
            Ok(Ok(())) => {
                match self
                    .wait_for_component(name, Some(self.config.self_register_timeout))
                    .await
                {
                    Ok(record) => {
                        self.log(
                            LogKind::Success,
                            &format!("Component {} loaded and registered", name),
                            json!({}),
                        );
                        Ok(record)
                    }
                    Err(cause) => {
                        self.log(
                            LogKind::Error,
                            &format!(
                                "Component {} loaded but failed to register: {}",
                                name, cause
                            ),
                            json!({}),
                        );
                        Err(RegistryError::LoadFailure {
                            name: name.to_string(),
                            location: location.to_string(),
                            message: cause.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Names currently being fetched.
    pub fn loading_components(&self) -> Vec<String> {
        self.loading.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.get_status(name) == Some(ModuleStatus::Pending)
    }
}
