//! Typed component definitions.
//!
//! Definitions arrive as JSON. The document is first read into permissive
//! `Raw*` shapes with serde, then converted into the closed types below so
//! that template nodes, iteration and actions are matched exhaustively
//! everywhere else.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::FactoryError;
use crate::value;

/// `(property, value)` pairs in declaration order.
pub type Rules = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub structure: Vec<TemplateNode>,
    pub styles: Styles,
    /// Event name to handler entries, in declaration order.
    pub handlers: Vec<(String, Vec<Arc<HandlerSpec>>)>,
    pub defaults: Defaults,
    pub dependencies: Vec<String>,
    /// Aliases used by `dispatch`, event name to full event name.
    pub events: BTreeMap<String, String>,
    pub configuration: Value,
    pub classes: Classes,
}

impl Definition {
    /// Reads the name from a flat `{name}` or nested `{component:{name}}`
    /// document.
    pub fn name_of(document: &Value) -> Option<String> {
        let name = document
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| value::lookup(document, "component.name").found()?.as_str())?;
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    pub fn from_value(document: Value) -> Result<Self, FactoryError> {
        let name = Self::name_of(&document).ok_or(FactoryError::MalformedDefinition)?;
        let raw: RawDefinition =
            serde_json::from_value(document).map_err(|e| FactoryError::InvalidDefinition {
                name: name.clone(),
                message: e.to_string(),
            })?;
        raw.into_definition(name)
    }

    pub fn from_json(text: &str) -> Result<Self, FactoryError> {
        let document: Value =
            serde_json::from_str(text).map_err(|e| FactoryError::InvalidDefinition {
                name: "<unparsed>".to_string(),
                message: e.to_string(),
            })?;
        Self::from_value(document)
    }

    /// Full name of an instance event: the alias when declared, otherwise
    /// `<name><Event>`.
    pub fn event_name(&self, event: &str) -> String {
        if let Some(alias) = self.events.get(event) {
            return alias.clone();
        }
        let mut chars = event.chars();
        match chars.next() {
            Some(first) => format!("{}{}{}", self.name, first.to_uppercase(), chars.as_str()),
            None => self.name.clone(),
        }
    }

    pub fn css_variable(&self, variable: &str) -> Option<&Value> {
        self.configuration.get("cssVariables")?.get(variable)
    }

    pub fn has_css_variables(&self) -> bool {
        self.configuration
            .get("cssVariables")
            .map(Value::is_object)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Literal(String),
    Element(ElementNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<(String, AttributeValue)>,
    pub content: Option<String>,
    pub children: Vec<TemplateNode>,
    pub condition: Option<Condition>,
    pub iteration: Iteration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Iteration {
    None,
    /// Each item is aliased under `alias`, its index under `<alias>Index`.
    /// When `path` does not resolve to an array, a legacy `for` key given on
    /// the same node is tried instead.
    Repeat {
        path: String,
        alias: String,
        fallback: Option<String>,
    },
    /// Each item's fields are merged into the context, the index goes under
    /// `<path>Index`.
    LegacyFor { path: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Literal(String),
    Bind(Binding),
}

/// Sources are tried in field order: theme variable, data, configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    #[serde(default)]
    pub css_variable: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    Exists,
    NotExists,
    Truthy,
    Falsy,
    /// Anything else; the condition always passes.
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Styles {
    pub base: Rules,
    pub variants: Vec<(String, Rules)>,
    pub states: Vec<(String, Rules)>,
    pub responsive: Vec<(String, Rules)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub data: Value,
    pub state: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            data: Value::Object(Map::new()),
            state: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Classes {
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub variants: BTreeMap<String, String>,
}

/// One `{selector?, action, data}` entry under an event name.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSpec {
    pub selector: Option<String>,
    pub action: Action,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Merges `payload` over the handler data into the instance data.
    UpdateData { payload: Value },
    SetState { state: Option<String> },
    Dispatch { event: Option<String>, data: Value },
    Method { method: String, args: Vec<Value> },
    /// Invokes a handler from the factory's handler table.
    Custom { handler: Option<String> },
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let payload = raw.payload;
        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);
        let action = match raw.kind.as_str() {
            "updateData" => Action::UpdateData {
                payload: payload.clone(),
            },
            "setState" => Action::SetState {
                state: text("state"),
            },
            "dispatch" => Action::Dispatch {
                event: text("event"),
                data: payload.get("data").cloned().unwrap_or(Value::Null),
            },
            "method" => Action::Method {
                method: text("method").ok_or("method action without payload.method")?,
                args: payload
                    .get("args")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            },
            "custom" => Action::Custom {
                handler: text("handler"),
            },
            other => return Err(format!("unknown action type '{}'", other)),
        };
        Ok(action)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDefinition {
    #[serde(default)]
    component: Option<RawComponent>,
    #[serde(default)]
    template: RawTemplate,
    #[serde(default)]
    styles: RawStyles,
    #[serde(default)]
    handlers: Map<String, Value>,
    #[serde(default)]
    defaults: RawDefaults,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    events: BTreeMap<String, String>,
    #[serde(default)]
    configuration: Value,
    #[serde(default)]
    classes: Classes,
}

#[derive(Debug, Default, Deserialize)]
struct RawComponent {
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTemplate {
    #[serde(default)]
    structure: Vec<RawNode>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStyles {
    #[serde(default)]
    base: Map<String, Value>,
    #[serde(default)]
    variants: Map<String, Value>,
    #[serde(default)]
    states: Map<String, Value>,
    #[serde(default)]
    responsive: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDefaults {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNode {
    Literal(String),
    Element(RawElement),
}

#[derive(Debug, Deserialize)]
struct RawElement {
    #[serde(default = "default_tag")]
    tag: String,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    children: Vec<RawNode>,
    #[serde(default)]
    condition: Option<Condition>,
    #[serde(default)]
    repeat: Option<RawRepeat>,
    #[serde(default, rename = "for")]
    for_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepeat {
    collection: String,
    item: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(RawHandler),
    Many(Vec<RawHandler>),
}

#[derive(Debug, Deserialize)]
struct RawHandler {
    #[serde(default)]
    selector: Option<String>,
    action: RawAction,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

fn default_tag() -> String {
    "div".to_string()
}

impl From<RawNode> for TemplateNode {
    fn from(raw: RawNode) -> Self {
        match raw {
            RawNode::Literal(text) => TemplateNode::Literal(text),
            RawNode::Element(element) => {
                let iteration = match (element.repeat, element.for_key) {
                    (Some(repeat), fallback) => Iteration::Repeat {
                        path: repeat.collection,
                        alias: repeat.item,
                        fallback,
                    },
                    (None, Some(path)) => Iteration::LegacyFor { path },
                    (None, None) => Iteration::None,
                };
                let content = Some(element.content)
                    .filter(|c| value::is_truthy(Some(c)))
                    .map(|c| value::to_text(&c));
                TemplateNode::Element(ElementNode {
                    tag: element.tag,
                    attributes: element
                        .attributes
                        .into_iter()
                        .map(|(key, raw)| (key, attribute_value(raw)))
                        .collect(),
                    content,
                    children: element.children.into_iter().map(Into::into).collect(),
                    condition: element.condition,
                    iteration,
                })
            }
        }
    }
}

fn attribute_value(raw: Value) -> AttributeValue {
    if let Some(bind) = raw.get("bind") {
        if let Ok(binding) = serde_json::from_value::<Binding>(bind.clone()) {
            return AttributeValue::Bind(binding);
        }
    }
    AttributeValue::Literal(value::to_text(&raw))
}

fn rules(map: &Map<String, Value>) -> Rules {
    map.iter()
        .map(|(property, value)| (property.clone(), value::to_text(value)))
        .collect()
}

fn rule_sets(map: Map<String, Value>) -> Vec<(String, Rules)> {
    map.into_iter()
        .map(|(key, value)| {
            let set = value.as_object().map(rules).unwrap_or_default();
            (key, set)
        })
        .collect()
}

impl RawDefinition {
    fn into_definition(self, name: String) -> Result<Definition, FactoryError> {
        let invalid = |message: String| FactoryError::InvalidDefinition {
            name: name.clone(),
            message,
        };

        let mut handlers = Vec::new();
        for (event, entries) in self.handlers {
            let entries: OneOrMany = serde_json::from_value(entries)
                .map_err(|e| invalid(format!("handler '{}': {}", event, e)))?;
            let entries = match entries {
                OneOrMany::One(one) => vec![one],
                OneOrMany::Many(many) => many,
            };
            let specs = entries
                .into_iter()
                .map(|entry| -> Result<Arc<HandlerSpec>, FactoryError> {
                    Ok(Arc::new(HandlerSpec {
                        selector: entry.selector.filter(|s| !s.trim().is_empty()),
                        action: Action::try_from(entry.action)
                            .map_err(|e| invalid(format!("handler '{}': {}", event, e)))?,
                        data: entry.data,
                    }))
                })
                .collect::<Result<Vec<_>, FactoryError>>()?;
            handlers.push((event, specs));
        }

        let mut dependencies = self.dependencies;
        for dep in self.component.map(|c| c.dependencies).unwrap_or_default() {
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        let defaults = Defaults {
            data: match self.defaults.data {
                Some(data @ Value::Object(_)) => data,
                _ => Value::Object(Map::new()),
            },
            state: self
                .defaults
                .state
                .unwrap_or_else(|| Defaults::default().state),
        };

        Ok(Definition {
            structure: self.template.structure.into_iter().map(Into::into).collect(),
            styles: Styles {
                base: rules(&self.styles.base),
                variants: rule_sets(self.styles.variants),
                states: rule_sets(self.styles.states),
                responsive: rule_sets(self.styles.responsive),
            },
            handlers,
            defaults,
            dependencies,
            events: self.events,
            configuration: self.configuration,
            classes: self.classes,
            name,
        })
    }
}
