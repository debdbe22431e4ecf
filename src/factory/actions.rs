//! Declarative event wiring.
//!
//! A [`ListenerTable`] is built from a definition's handlers against one
//! rendered root: selector-qualified handlers bind to the descendants that
//! match at wiring time, the rest bind to the root. Firing an event bubbles
//! from the target up to the root, running each bound action in turn.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use super::definition::{Action, HandlerSpec};
use super::dom::{Element, NodePath, Selector};
use super::instance::Instance;
use crate::value;

/// A simulated user event as seen by an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub event: String,
    /// Path of the element the event was fired on.
    pub target_path: NodePath,
    pub target: Element,
    /// Path of the element whose listener is running.
    pub current_path: NodePath,
}

pub type CustomHandler = Arc<dyn Fn(&Occurrence, &Instance, &Value) + Send + Sync>;

/// Named handlers reachable from `custom` actions.
#[derive(Default)]
pub struct HandlerTable {
    handlers: DashMap<String, CustomHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Occurrence, &Instance, &Value) + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<CustomHandler> {
        self.handlers.get(name).map(|h| h.clone())
    }

    pub fn remove(&self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.handlers.iter().map(|h| h.key().clone()).collect();
        f.debug_struct("HandlerTable").field("handlers", &names).finish()
    }
}

#[derive(Debug, Clone)]
pub struct Listener {
    pub event: String,
    pub selector: Option<String>,
    /// Position of the handler within its event's entries.
    pub index: usize,
    pub path: NodePath,
    pub handler: Arc<HandlerSpec>,
}

impl Listener {
    /// `event-selector-index` or `event-index`.
    pub fn key(&self) -> String {
        match &self.selector {
            Some(selector) => format!("{}-{}-{}", self.event, selector, self.index),
            None => format!("{}-{}", self.event, self.index),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListenerTable {
    listeners: Vec<Listener>,
}

impl ListenerTable {
    pub fn wire(root: &Element, handlers: &[(String, Vec<Arc<HandlerSpec>>)]) -> Self {
        let mut listeners = Vec::new();
        for (event, entries) in handlers {
            for (index, handler) in entries.iter().enumerate() {
                let paths = match &handler.selector {
                    None => vec![Vec::new()],
                    Some(text) => match text.parse::<Selector>() {
                        Ok(selector) => root.query_selector_all(&selector),
                        Err(e) => {
                            warn!("{}; handler for '{}' not attached", e, event);
                            continue;
                        }
                    },
                };
                for path in paths {
                    listeners.push(Listener {
                        event: event.clone(),
                        selector: handler.selector.clone(),
                        index,
                        path,
                        handler: handler.clone(),
                    });
                }
            }
        }
        debug!("Wired {} listeners", listeners.len());
        Self { listeners }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.iter()
    }

    /// Drops every listener and returns how many were attached.
    pub fn detach_all(&mut self) -> usize {
        let count = self.listeners.len();
        self.listeners.clear();
        count
    }

    /// Listeners an `event` fired at `target` reaches, innermost first.
    pub fn bubbling(&self, event: &str, target: &[usize]) -> Vec<Listener> {
        (0..=target.len())
            .rev()
            .flat_map(|depth| {
                let level = &target[..depth];
                self.listeners
                    .iter()
                    .filter(move |l| l.event == event && l.path == level)
            })
            .cloned()
            .collect()
    }
}

/// Runs one action on behalf of `instance`.
pub fn perform(
    handler: &HandlerSpec,
    occurrence: &Occurrence,
    instance: &Instance,
    handlers: &HandlerTable,
) {
    let data = &handler.data;
    let from_data = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
    match &handler.action {
        Action::UpdateData { payload } => {
            instance.update_data(value::shallow_merge(data, payload));
        }
        Action::SetState { state } => match state.clone().or_else(|| from_data("state")) {
            Some(state) => instance.set_state(&state),
            None => warn!("setState action on {} without a state", instance.id()),
        },
        Action::Dispatch { event, data: detail } => {
            match event.clone().or_else(|| from_data("event")) {
                Some(event) => {
                    instance.dispatch(&event, detail.clone());
                }
                None => warn!("dispatch action on {} without an event", instance.id()),
            }
        }
        Action::Method { method, args } => {
            if !instance.invoke(method, args) {
                debug!("Instance has no method '{}'", method);
            }
        }
        Action::Custom { handler: name } => {
            match name.as_deref().and_then(|name| handlers.get(name)) {
                Some(custom) => custom(occurrence, instance, data),
                None => debug!("No custom handler {:?} registered", name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::definition::Definition;
    use crate::factory::dom::Node;
    use serde_json::json;

    fn root() -> Element {
        let mut button = Element::new("button");
        button.set_attribute("class", "go");
        let mut other = Element::new("button");
        other.set_attribute("class", "go");
        let mut bar = Element::new("div");
        bar.push(Node::Element(button));
        bar.push(Node::Element(other));
        let mut root = Element::new("section");
        root.push(Node::Element(bar));
        root
    }

    fn handlers(document: Value) -> Vec<(String, Vec<Arc<HandlerSpec>>)> {
        Definition::from_value(document).unwrap().handlers
    }

    #[test]
    fn test_wiring_and_keys() {
        let table = ListenerTable::wire(
            &root(),
            &handlers(json!({"name": "t", "handlers": {
                "click": [
                    {"selector": ".go", "action": {"type": "method", "payload": {"method": "render"}}},
                    {"action": {"type": "setState", "payload": {"state": "on"}}}
                ]
            }})),
        );
        assert_eq!(table.len(), 3);
        let keys: Vec<String> = table.iter().map(Listener::key).collect();
        assert_eq!(keys, vec!["click-.go-0", "click-.go-0", "click-1"]);
    }

    #[test]
    fn test_bubbling_order() {
        let table = ListenerTable::wire(
            &root(),
            &handlers(json!({"name": "t", "handlers": {
                "click": [
                    {"action": {"type": "setState", "payload": {"state": "root"}}},
                    {"selector": "div", "action": {"type": "setState", "payload": {"state": "bar"}}},
                    {"selector": "button", "action": {"type": "setState", "payload": {"state": "btn"}}}
                ],
                "keyup": {"action": {"type": "custom"}}
            }})),
        );
        let reached: Vec<usize> = table
            .bubbling("click", &[0, 1])
            .iter()
            .map(|l| l.index)
            .collect();
        assert_eq!(reached, vec![2, 1, 0]);
        assert_eq!(table.bubbling("click", &[]).len(), 1);
        assert_eq!(table.bubbling("focus", &[0, 1]).len(), 0);
    }

    #[test]
    fn test_invalid_selector_is_skipped() {
        let table = ListenerTable::wire(
            &root(),
            &handlers(json!({"name": "t", "handlers": {
                "click": {"selector": "div[", "action": {"type": "custom"}}
            }})),
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_detach_all() {
        let mut table = ListenerTable::wire(
            &root(),
            &handlers(json!({"name": "t", "handlers": {
                "click": {"action": {"type": "custom"}}
            }})),
        );
        assert_eq!(table.detach_all(), 1);
        assert!(table.is_empty());
    }
}
