use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wb_components::config::{self, SystemConfig};
use wb_components::fetch::MemoryFetcher;
use wb_components::registry::{ElementClass, HealthStatus, Implementation, ModuleCatalog};
use wb_components::system::System;
use wb_components::{CreateOptions, EventType, InternalResult};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn fast_config() -> SystemConfig {
    let mut config = SystemConfig::default();
    config.registry.health_interval = Duration::from_millis(30);
    config.registry.wait_timeout = Duration::from_millis(200);
    config
}

#[tokio::test]
async fn test_health_sweep_counts_live_instances() -> InternalResult<()> {
    let system = System::new(&fast_config(), Arc::new(MemoryFetcher::new()));
    system
        .registry()
        .register(
            "badge",
            Some(Implementation::Element(ElementClass::plain("wb-badge"))),
            Vec::<String>::new(),
            json!({}),
        )
        .await?;
    system.factory().register(json!({
        "name": "badge",
        "template": {"structure": [{"tag": "span", "content": "{{label}}"}]}
    }))?;

    let first = system
        .factory()
        .create("badge", CreateOptions::default())
        .await
        .unwrap();
    system
        .factory()
        .create("badge", CreateOptions::default())
        .await
        .unwrap();

    // the registry defined <badge>, so instances use it as their root
    assert_eq!(first.element().tag, "wb-badge");

    system.start().await?;
    assert!(system.is_monitoring());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(system.registry().get_record("badge").unwrap().instance_count, 2);

    first.destroy();
    system.elements().undefine("badge");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let record = system.registry().get_record("badge").unwrap();
    assert_eq!(record.instance_count, 1);
    assert_eq!(record.health, HealthStatus::Unhealthy);

    system.shutdown().await?;
    assert!(!system.is_monitoring());
    Ok(())
}

#[tokio::test]
async fn test_monitoring_can_be_disabled() -> InternalResult<()> {
    let config: SystemConfig = config::from_str(r#"{"registry": {"health_enabled": false}}"#)?;
    let system = System::new(&config, Arc::new(MemoryFetcher::new()));
    system.start().await?;
    assert!(!system.is_monitoring());
    system.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_loader_and_factory_share_one_bus() -> InternalResult<()> {
    let catalog = Arc::new(ModuleCatalog::new());
    catalog.publish_element("/components/wb-tabs/wb-tabs.js", "wb-tabs", &[]);
    let system = System::new(&fast_config(), Arc::new(MemoryFetcher::new())).with_loader(catalog);
    let mut rx = system.event_bus().subscribe();

    system.registry().load_component("wb-tabs", None).await?;
    system.factory().register(json!({
        "name": "wb-tabs",
        "template": {"structure": [{"tag": "nav", "attributes": {"class": "tabs"}}]}
    }))?;
    let tabs = system
        .factory()
        .create("wb-tabs", CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(tabs.element().attribute("class"), Some("tabs"));

    let events = rx.drain();
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::ComponentLoaded));
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::Instance("wb-tabsReady".to_string())));

    system.reset();
    assert!(system.factory().instances().is_empty());
    assert!(system.registry().get_record("wb-tabs").is_none());
    assert_eq!(system.document().stylesheet_count(), 0);
    Ok(())
}
