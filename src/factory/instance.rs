use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::actions::{self, HandlerTable, ListenerTable, Occurrence};
use super::definition::Definition;
use super::dom::{self, Document, Element, Node, Selector};
use super::style;
use super::template::TemplateCompiler;
use crate::event::{Event, EventBus, EventType};
use crate::registry::ElementRegistry;
use crate::value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateOptions {
    /// Shallow-merged over the definition's default data.
    #[serde(default)]
    pub data: Value,
    /// Key into the definition's `classes.variants`.
    #[serde(default)]
    pub variant: Option<String>,
}

impl CreateOptions {
    pub fn with_data(data: Value) -> Self {
        Self {
            data,
            variant: None,
        }
    }

    pub fn variant(mut self, variant: &str) -> Self {
        self.variant = Some(variant.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum InstanceStatus {
    Initializing,
    Ready,
    Destroyed,
}

/// Shared collaborators of every instance a factory creates.
pub(crate) struct InstanceScope {
    pub document: Arc<Document>,
    pub elements: Arc<ElementRegistry>,
    pub handlers: Arc<HandlerTable>,
    pub event_bus: Arc<EventBus>,
    pub live: Arc<DashMap<String, Instance>>,
}

struct InstanceState {
    status: InstanceStatus,
    data: Value,
    state: String,
    /// Set once `set_state` ran; the root then carries `data-state`.
    state_applied: bool,
    element: Element,
    markup: String,
    listeners: ListenerTable,
    stylesheet: Option<String>,
}

struct InstanceInner {
    id: String,
    definition: Arc<Definition>,
    variant: Option<String>,
    scope: Arc<InstanceScope>,
    state: Mutex<InstanceState>,
}

/// A live realization of a definition. Cloning yields another handle to the
/// same instance.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("definition", &self.inner.definition.name)
            .field("status", &self.status())
            .finish()
    }
}

impl Instance {
    pub(crate) fn new(
        definition: Arc<Definition>,
        options: CreateOptions,
        scope: Arc<InstanceScope>,
    ) -> Self {
        let state = InstanceState {
            status: InstanceStatus::Initializing,
            data: value::shallow_merge(&definition.defaults.data, &options.data),
            state: definition.defaults.state.clone(),
            state_applied: false,
            element: Element::new("div"),
            markup: String::new(),
            listeners: ListenerTable::default(),
            stylesheet: None,
        };
        Self {
            inner: Arc::new(InstanceInner {
                id: format!("component-{}", Uuid::new_v4().simple()),
                definition,
                variant: options.variant,
                scope,
                state: Mutex::new(state),
            }),
        }
    }

    /// Builds the element, installs the stylesheet, wires handlers and
    /// announces `ready`.
    pub(crate) fn initialize(&self) {
        {
            let mut state = self.lock();
            self.rebuild(&mut state);
            let css = style::synthesize(&self.inner.definition.styles, &self.inner.id);
            if !css.is_empty() {
                self.inner.scope.document.add_stylesheet(&self.inner.id, css.clone());
                state.stylesheet = Some(css);
            }
            state.status = InstanceStatus::Ready;
        }
        self.dispatch("ready", json!({}));
    }

    fn lock(&self) -> MutexGuard<'_, InstanceState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn rebuild(&self, state: &mut InstanceState) {
        let definition = &self.inner.definition;
        let nodes = TemplateCompiler::new(definition).compile(&state.data);
        state.markup = dom::to_html(&nodes);

        let first = nodes.iter().find_map(Node::as_element);
        let mut root = match (self.inner.scope.elements.construct(&definition.name), first) {
            (Some(mut custom), Some(content)) => {
                custom.attributes = content.attributes.clone();
                custom.children = content.children.clone();
                custom
            }
            (Some(mut custom), None) => {
                custom.children = nodes.clone();
                custom
            }
            (None, Some(content)) => content.clone(),
            (None, None) => {
                let mut wrapper = Element::new("div");
                wrapper.children = nodes.clone();
                wrapper
            }
        };

        root.set_attribute("id", self.inner.id.as_str());
        if let Some(base) = &definition.classes.base {
            root.add_class(base);
        }
        if let Some(class) = self
            .inner
            .variant
            .as_deref()
            .and_then(|v| definition.classes.variants.get(v))
        {
            root.add_class(class);
        }
        if state.state_applied {
            root.set_attribute("data-state", state.state.as_str());
        }

        state.listeners = ListenerTable::wire(&root, &definition.handlers);
        state.element = root;
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Name of the backing definition.
    pub fn name(&self) -> &str {
        &self.inner.definition.name
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.inner.definition
    }

    pub fn status(&self) -> InstanceStatus {
        self.lock().status
    }

    pub fn is_destroyed(&self) -> bool {
        self.status() == InstanceStatus::Destroyed
    }

    pub fn data(&self) -> Value {
        self.lock().data.clone()
    }

    pub fn state(&self) -> String {
        self.lock().state.clone()
    }

    /// Markup compiled from the template for the current data.
    pub fn markup(&self) -> String {
        self.lock().markup.clone()
    }

    /// The root element, including its id, classes and state attribute.
    pub fn outer_html(&self) -> String {
        self.lock().element.outer_html()
    }

    pub fn element(&self) -> Element {
        self.lock().element.clone()
    }

    pub fn stylesheet(&self) -> Option<String> {
        self.lock().stylesheet.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Marks the root as mounted in the document.
    pub fn attach(&self) {
        if self.is_destroyed() {
            warn!("Cannot attach destroyed instance {}", self.inner.id);
            return;
        }
        self.inner.scope.document.attach(&self.inner.id);
    }

    pub fn is_attached(&self) -> bool {
        self.inner.scope.document.is_attached(&self.inner.id)
    }

    /// Merges `partial` into the data and re-renders immediately.
    pub fn update_data(&self, partial: Value) {
        let mut state = self.lock();
        if state.status == InstanceStatus::Destroyed {
            warn!("update_data on destroyed instance {}", self.inner.id);
            return;
        }
        state.data = value::shallow_merge(&state.data, &partial);
        self.rebuild(&mut state);
    }

    pub fn set_state(&self, new_state: &str) {
        {
            let mut state = self.lock();
            if state.status == InstanceStatus::Destroyed {
                warn!("set_state on destroyed instance {}", self.inner.id);
                return;
            }
            state.state = new_state.to_string();
            state.state_applied = true;
            state.element.set_attribute("data-state", new_state);
        }
        self.dispatch("stateChanged", json!({ "state": new_state }));
    }

    /// Recompiles the template and re-wires every handler against the new
    /// tree.
    pub fn render(&self) {
        let mut state = self.lock();
        if state.status == InstanceStatus::Destroyed {
            warn!("render on destroyed instance {}", self.inner.id);
            return;
        }
        self.rebuild(&mut state);
    }

    /// Publishes a named instance event carrying `detail` plus `component`
    /// and `id`. Returns the full event name, or `None` once destroyed.
    pub fn dispatch(&self, event: &str, detail: Value) -> Option<String> {
        if self.is_destroyed() {
            debug!("Not dispatching {} from destroyed {}", event, self.inner.id);
            return None;
        }
        let full_name = self.inner.definition.event_name(event);
        let mut parameters = match detail {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        parameters.insert("component".to_string(), json!(self.name()));
        parameters.insert("id".to_string(), json!(self.inner.id));
        self.inner.scope.event_bus.publish(Event::new(
            EventType::Instance(full_name.clone()),
            parameters,
        ));
        Some(full_name)
    }

    /// Invokes an instance method by its declared name. Returns `false` for
    /// unknown methods.
    pub fn invoke(&self, method: &str, args: &[Value]) -> bool {
        let text = |i: usize| args.get(i).and_then(Value::as_str);
        match method {
            "updateData" => self.update_data(args.first().cloned().unwrap_or(Value::Null)),
            "setState" => match text(0) {
                Some(state) => self.set_state(state),
                None => warn!("setState called without a state"),
            },
            "render" => self.render(),
            "destroy" => self.destroy(),
            "dispatchEvent" | "dispatch" => match text(0) {
                Some(event) => {
                    self.dispatch(event, args.get(1).cloned().unwrap_or(Value::Null));
                }
                None => warn!("dispatchEvent called without an event name"),
            },
            _ => return false,
        }
        true
    }

    /// Simulates `event` on the first element matching `selector` (the root
    /// when `None`) and runs every listener it bubbles through. Returns the
    /// number of listeners reached.
    pub fn fire(&self, event: &str, selector: Option<&str>) -> usize {
        let (occurrence, reached) = {
            let state = self.lock();
            if state.status != InstanceStatus::Ready {
                debug!("Ignoring {} on {} instance", event, state.status);
                return 0;
            }
            let target_path = match selector {
                None => Vec::new(),
                Some(text) => {
                    let parsed = match text.parse::<Selector>() {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            warn!("{}", e);
                            return 0;
                        }
                    };
                    match state.element.query_selector(&parsed) {
                        Some(path) => path,
                        None => {
                            debug!("No element matches {} in {}", text, self.inner.id);
                            return 0;
                        }
                    }
                }
            };
            let target = state
                .element
                .element_at(&target_path)
                .cloned()
                .unwrap_or_default();
            let reached = state.listeners.bubbling(event, &target_path);
            let occurrence = Occurrence {
                event: event.to_string(),
                target_path,
                target,
                current_path: Vec::new(),
            };
            (occurrence, reached)
        };

        for listener in &reached {
            if self.is_destroyed() {
                break;
            }
            let current = Occurrence {
                current_path: listener.path.clone(),
                ..occurrence.clone()
            };
            actions::perform(&listener.handler, &current, self, &self.inner.scope.handlers);
        }
        reached.len()
    }

    /// Detaches listeners, removes the stylesheet and the element, and
    /// leaves the live table. Calling it again is a no-op, and resources
    /// already removed elsewhere are skipped.
    pub fn destroy(&self) {
        {
            let mut state = self.lock();
            if state.status == InstanceStatus::Destroyed {
                debug!("Instance {} already destroyed", self.inner.id);
                return;
            }
            let detached = state.listeners.detach_all();
            debug!("Detached {} listeners from {}", detached, self.inner.id);

            let document = &self.inner.scope.document;
            if state.stylesheet.take().is_some() && !document.remove_stylesheet(&self.inner.id) {
                debug!("Stylesheet for {} was already removed", self.inner.id);
            }
            if !document.detach(&self.inner.id) {
                debug!("Element {} was not attached", self.inner.id);
            }
            state.status = InstanceStatus::Destroyed;
        }
        self.inner.scope.live.remove(&self.inner.id);
        info!("Destroyed {} ({})", self.inner.id, self.name());
    }
}
