use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::elements::ElementClass;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModuleStatus {
    Pending,
    Loaded,
    Failed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthStatus {
    /// Not loaded yet, so never inspected.
    Unknown,
    Healthy,
    Unhealthy,
    Failed,
}

/// What a module hands to `register`.
#[derive(Clone)]
pub enum Implementation {
    /// A constructible UI element. Registering it defines `<name>` in the
    /// element registry once.
    Element(ElementClass),
    /// Anything else a module wants to publish (a service object, helpers).
    Service(Arc<dyn Any + Send + Sync>),
}

impl Implementation {
    pub fn element_class(&self) -> Option<&ElementClass> {
        match self {
            Implementation::Element(class) => Some(class),
            Implementation::Service(_) => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Implementation::Element(_))
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::Element(_) => f.write_str("Implementation::Element"),
            Implementation::Service(_) => f.write_str("Implementation::Service"),
        }
    }
}

/// The registry's bookkeeping entry for one named module.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub name: String,
    #[serde(skip)]
    pub implementation: Option<Implementation>,
    pub status: ModuleStatus,
    pub dependencies: Vec<String>,
    pub metadata: Value,
    pub health: HealthStatus,
    pub loaded_at: DateTime<Utc>,
    pub load_time_ms: u64,
    pub instance_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_error: Option<String>,
}

impl ModuleRecord {
    pub fn pending(name: &str, dependencies: Vec<String>, metadata: Value) -> Self {
        Self {
            name: name.to_string(),
            implementation: None,
            status: ModuleStatus::Pending,
            dependencies,
            metadata,
            health: HealthStatus::Unknown,
            loaded_at: Utc::now(),
            load_time_ms: 0,
            instance_count: 0,
            error: None,
            health_error: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.status == ModuleStatus::Loaded
    }

    pub fn is_element(&self) -> bool {
        self.implementation
            .as_ref()
            .map(Implementation::is_element)
            .unwrap_or(false)
    }
}
