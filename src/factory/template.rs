//! Template compilation: definition structure plus a data context in, element
//! tree out. Compilation is pure; the same structure and data always produce
//! the same nodes.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

use super::definition::{
    AttributeValue, Binding, Condition, Definition, ElementNode, Iteration, Operator, TemplateNode,
};
use super::dom::{Element, Node};
use crate::value::{self, Lookup};

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"\{\{([^}]+)\}\}").unwrap();
}

/// Replaces every `{{dotted.path}}` with its value. Unresolved tokens stay in
/// place; objects and arrays are JSON-encoded with quotes escaped so the
/// result is safe inside an attribute.
pub fn interpolate(template: &str, context: &Value) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures| {
            match value::lookup(context, caps[1].trim()) {
                Lookup::NotFound => caps[0].to_string(),
                Lookup::Found(found @ (Value::Object(_) | Value::Array(_))) => {
                    found.to_string().replace('"', "&quot;")
                }
                Lookup::Found(found) => value::to_text(found),
            }
        })
        .into_owned()
}

/// Evaluates a node condition against the context. Unknown operators pass.
pub fn evaluate_condition(condition: &Condition, context: &Value) -> bool {
    let field = value::lookup(context, &condition.field).found();
    match condition.operator {
        Operator::Equals => field == condition.value.as_ref(),
        Operator::NotEquals => field != condition.value.as_ref(),
        Operator::Exists => field.is_some(),
        Operator::NotExists => field.is_none(),
        Operator::Truthy => value::is_truthy(field),
        Operator::Falsy => !value::is_truthy(field),
        Operator::Unknown => true,
    }
}

pub struct TemplateCompiler<'a> {
    definition: &'a Definition,
}

impl<'a> TemplateCompiler<'a> {
    pub fn new(definition: &'a Definition) -> Self {
        Self { definition }
    }

    /// Compiles the definition's whole structure.
    pub fn compile(&self, context: &Value) -> Vec<Node> {
        self.compile_nodes(&self.definition.structure, context)
    }

    pub fn compile_nodes(&self, nodes: &[TemplateNode], context: &Value) -> Vec<Node> {
        let mut out = Vec::new();
        for node in nodes {
            self.compile_node(node, context, &mut out);
        }
        out
    }

    fn compile_node(&self, node: &TemplateNode, context: &Value, out: &mut Vec<Node>) {
        let element = match node {
            TemplateNode::Literal(text) => {
                out.push(Node::Text(interpolate(text, context)));
                return;
            }
            TemplateNode::Element(element) => element,
        };

        if let Some(condition) = &element.condition {
            if !evaluate_condition(condition, context) {
                return;
            }
        }

        let collection = |path: &str| value::lookup(context, path).found().and_then(Value::as_array);
        match &element.iteration {
            Iteration::None => {}
            Iteration::Repeat {
                path,
                alias,
                fallback,
            } => {
                if let Some(items) = collection(path) {
                    for (index, item) in items.iter().enumerate() {
                        let scoped = value::with_entry(context, alias, item.clone());
                        let scoped = value::with_entry(
                            &scoped,
                            &format!("{}Index", alias),
                            Value::from(index),
                        );
                        out.extend(self.build_element(element, &scoped));
                    }
                    return;
                }
                if let Some((path, items)) = fallback
                    .as_deref()
                    .and_then(|path| Some((path, collection(path)?)))
                {
                    self.merge_each(element, context, path, items, out);
                    return;
                }
            }
            Iteration::LegacyFor { path } => {
                if let Some(items) = collection(path) {
                    self.merge_each(element, context, path, items, out);
                    return;
                }
            }
        }
        out.extend(self.build_element(element, context));
    }

    /// Legacy `for`: each item's fields are merged into the context.
    fn merge_each(
        &self,
        element: &ElementNode,
        context: &Value,
        path: &str,
        items: &[Value],
        out: &mut Vec<Node>,
    ) {
        for (index, item) in items.iter().enumerate() {
            let scoped = value::shallow_merge(context, item);
            let scoped = value::with_entry(&scoped, &format!("{}Index", path), Value::from(index));
            out.extend(self.build_element(element, &scoped));
        }
    }

    /// One element, or nothing for an `img` without a usable source.
    fn build_element(&self, node: &ElementNode, context: &Value) -> Option<Node> {
        if node.tag == "img" {
            let src = node
                .attributes
                .iter()
                .find(|(key, _)| key == "src")
                .and_then(|(_, value)| self.attribute(value, context))
                .unwrap_or_default();
            if src.is_empty() || src.contains("{{image}}") {
                return None;
            }
        }

        let mut element = Element::new(&node.tag);
        for (key, raw) in &node.attributes {
            if let Some(value) = self.attribute(raw, context) {
                element.attributes.push((key.clone(), value));
            }
        }
        if let Some(content) = &node.content {
            let text = interpolate(content, context);
            if !text.is_empty() {
                element.push(Node::Text(text));
            }
        }
        element
            .children
            .extend(self.compile_nodes(&node.children, context));
        Some(Node::Element(element))
    }

    /// Attribute text, `None` when empty so the attribute is omitted.
    fn attribute(&self, raw: &AttributeValue, context: &Value) -> Option<String> {
        match raw {
            AttributeValue::Literal(text) => Some(interpolate(text, context)),
            AttributeValue::Bind(binding) => self.resolve_binding(binding, context),
        }
        .filter(|text| !text.is_empty())
    }

    fn resolve_binding(&self, binding: &Binding, context: &Value) -> Option<String> {
        if let Some(variable) = &binding.css_variable {
            if self.definition.has_css_variables() {
                let name = self.definition.css_variable(variable)?;
                return Some(format!("var({})", value::to_text(name)));
            }
        }
        let bound = if let Some(path) = &binding.data {
            value::lookup(context, path).found()
        } else if let Some(key) = &binding.config {
            self.definition.configuration.get(key)
        } else {
            None
        };
        bound
            .filter(|v| value::is_truthy(Some(v)))
            .map(value::to_text)
    }
}
