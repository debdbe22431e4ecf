use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{ComponentRegistry, HealthStatus, ModuleStatus};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Health check failed for {name}: {message}")]
pub struct HealthCheckError {
    pub name: String,
    pub message: String,
}

/// Reports how many live instances of a component currently exist.
pub trait LivenessProbe: Send + Sync {
    fn live_instances(&self, name: &str) -> Result<usize, HealthCheckError>;
}

impl ComponentRegistry {
    /// One sweep over every loaded record. Element-backed records are
    /// unhealthy while their element definition is missing; a failing probe
    /// marks only that record unhealthy. Both conditions heal on a later
    /// sweep once the cause is gone.
    pub fn perform_health_checks(&self) {
        let probe = self.liveness_probe();
        let loaded: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.status == ModuleStatus::Loaded)
            .map(|r| r.key().clone())
            .collect();

        for name in loaded {
            let is_element = self
                .records
                .get(&name)
                .map(|r| r.is_element())
                .unwrap_or(false);
            let defined = !is_element || self.elements.is_defined(&name);
            let live = match &probe {
                Some(probe) => probe.live_instances(&name).map(Some),
                None => Ok(None),
            };

            if let Some(mut record) = self.records.get_mut(&name) {
                match live {
                    Ok(count) => {
                        if let Some(count) = count {
                            record.instance_count = count;
                        }
                        if is_element {
                            record.health = if defined {
                                HealthStatus::Healthy
                            } else {
                                HealthStatus::Unhealthy
                            };
                        } else if record.health == HealthStatus::Unhealthy {
                            record.health = HealthStatus::Healthy;
                        }
                        if record.health == HealthStatus::Healthy {
                            record.health_error = None;
                        }
                    }
                    Err(e) => {
                        warn!("{}", e);
                        record.health = HealthStatus::Unhealthy;
                        record.health_error = Some(e.message);
                    }
                }
            }
        }
    }

    /// Spawns the periodic sweep at the configured interval.
    pub async fn start_health_monitoring(&self) -> HealthMonitor {
        let monitor = HealthMonitor::new(self.clone());
        monitor.start().await;
        monitor
    }
}

/// Background task running [`ComponentRegistry::perform_health_checks`] on a
/// fixed cadence, independent of load and render activity.
pub struct HealthMonitor {
    registry: ComponentRegistry,
    running: Arc<AtomicBool>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            running: Arc::new(AtomicBool::new(false)),
            task_handle: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let registry = self.registry.clone();
        let running = self.running.clone();
        let period = registry.config().health_interval;
        debug!("Health monitoring every {:?}", period);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            interval.tick().await;
            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                registry.perform_health_checks();
            }
        });
        *self.task_handle.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task_handle.lock().await.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::event::EventBus;
    use crate::registry::{ElementClass, ElementRegistry, Implementation};
    use dashmap::DashMap;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingProbe {
        counts: DashMap<String, usize>,
        broken: DashMap<String, ()>,
    }

    impl LivenessProbe for CountingProbe {
        fn live_instances(&self, name: &str) -> Result<usize, HealthCheckError> {
            if self.broken.contains_key(name) {
                return Err(HealthCheckError {
                    name: name.to_string(),
                    message: "inspection failed".to_string(),
                });
            }
            Ok(self.counts.get(name).map(|c| *c).unwrap_or(0))
        }
    }

    async fn setup() -> (ComponentRegistry, Arc<CountingProbe>) {
        let registry = ComponentRegistry::new(
            RegistryConfig::default(),
            Arc::new(EventBus::new(64)),
            Arc::new(ElementRegistry::new()),
        );
        let probe = Arc::new(CountingProbe::default());
        registry.set_liveness_probe(probe.clone());
        for name in ["wb-a", "wb-b"] {
            registry
                .register(
                    name,
                    Some(Implementation::Element(ElementClass::plain("div"))),
                    Vec::<String>::new(),
                    json!({}),
                )
                .await
                .unwrap();
        }
        (registry, probe)
    }

    #[tokio::test]
    async fn test_counts_live_instances() {
        let (registry, probe) = setup().await;
        probe.counts.insert("wb-a".to_string(), 3);
        registry.perform_health_checks();
        assert_eq!(registry.get_record("wb-a").unwrap().instance_count, 3);
        assert!(registry.is_healthy("wb-a"));
    }

    #[tokio::test]
    async fn test_missing_definition_is_unhealthy_then_heals() {
        let (registry, _) = setup().await;
        registry.elements().undefine("wb-a");
        registry.perform_health_checks();
        assert!(!registry.is_healthy("wb-a"));
        assert!(registry.is_healthy("wb-b"));

        registry
            .elements()
            .define("wb-a", ElementClass::plain("div"));
        registry.perform_health_checks();
        assert!(registry.is_healthy("wb-a"));
    }

    #[tokio::test]
    async fn test_probe_failure_is_isolated() {
        let (registry, probe) = setup().await;
        probe.broken.insert("wb-a".to_string(), ());
        probe.counts.insert("wb-b".to_string(), 2);
        registry.perform_health_checks();

        let broken = registry.get_record("wb-a").unwrap();
        assert_eq!(broken.health, HealthStatus::Unhealthy);
        assert_eq!(broken.health_error.as_deref(), Some("inspection failed"));
        assert_eq!(broken.status, ModuleStatus::Loaded);
        assert_eq!(registry.get_record("wb-b").unwrap().instance_count, 2);

        probe.broken.remove("wb-a");
        registry.perform_health_checks();
        assert!(registry.is_healthy("wb-a"));
        assert!(registry.get_record("wb-a").unwrap().health_error.is_none());
    }

    #[tokio::test]
    async fn test_monitor_runs_periodically() {
        let mut config = RegistryConfig::default();
        config.health_interval = Duration::from_millis(20);
        let registry = ComponentRegistry::new(
            config,
            Arc::new(EventBus::new(64)),
            Arc::new(ElementRegistry::new()),
        );
        registry
            .register(
                "wb-a",
                Some(Implementation::Element(ElementClass::plain("div"))),
                Vec::<String>::new(),
                json!({}),
            )
            .await
            .unwrap();
        let monitor = registry.start_health_monitoring().await;
        assert!(monitor.is_running());

        registry.elements().undefine("wb-a");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!registry.is_healthy("wb-a"));

        monitor.stop().await;
        assert!(!monitor.is_running());
    }
}
