//! Minimal element tree standing in for a browser DOM.
//!
//! Instances own an [`Element`] tree; the shared [`Document`] only tracks
//! which instance roots are attached and which scoped stylesheets are
//! installed. Text nodes are emitted verbatim when serialized, matching how
//! generated markup was inserted as inner HTML.

use std::fmt;
use std::str::FromStr;

use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tracing::debug;

/// Child indices from a root element down to a descendant. The root itself
/// is the empty path.
pub type NodePath = Vec<usize>;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Element(Element),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        }
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => element.write_html(out),
        }
    }
}

/// Serializes a node list without any wrapper.
pub fn to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        node.write_html(&mut out);
    }
    out
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    /// Attributes in insertion order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|(key, _)| key != name);
        before != self.attributes.len()
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if class.is_empty() || self.has_class(class) {
            return;
        }
        let joined = match self.attribute("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing, class),
            _ => class.to_string(),
        };
        self.set_attribute("class", joined);
    }

    pub fn push(&mut self, node: Node) {
        self.children.push(node);
    }

    pub fn element_at(&self, path: &[usize]) -> Option<&Element> {
        let mut current = self;
        for index in path {
            current = current.children.get(*index)?.as_element()?;
        }
        Some(current)
    }

    /// Paths of every descendant matching `selector`, in document order.
    /// The element itself is never a candidate.
    pub fn query_selector_all(&self, selector: &Selector) -> Vec<NodePath> {
        let mut matches = Vec::new();
        let mut ancestors = vec![self];
        self.collect_matches(selector, &mut Vec::new(), &mut ancestors, &mut matches);
        matches
    }

    pub fn query_selector(&self, selector: &Selector) -> Option<NodePath> {
        self.query_selector_all(selector).into_iter().next()
    }

    fn collect_matches<'a>(
        &'a self,
        selector: &Selector,
        path: &mut NodePath,
        ancestors: &mut Vec<&'a Element>,
        matches: &mut Vec<NodePath>,
    ) {
        for (index, node) in self.children.iter().enumerate() {
            let Node::Element(child) = node else {
                continue;
            };
            path.push(index);
            if selector.matches(child, ancestors) {
                matches.push(path.clone());
            }
            ancestors.push(child);
            child.collect_matches(selector, path, ancestors, matches);
            ancestors.pop();
            path.pop();
        }
    }

    /// Void elements are written without children or a closing tag.
    pub fn is_void(&self) -> bool {
        VOID_TAGS.contains(&self.tag.as_str())
    }

    pub fn inner_html(&self) -> String {
        to_html(&self.children)
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(value);
            out.push('"');
        }
        out.push('>');
        if self.is_void() {
            return;
        }
        for child in &self.children {
            child.write_html(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.outer_html())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid selector: {selector}")]
pub struct SelectorError {
    pub selector: String,
}

/// One `tag.class#id[attr=value]` step.
#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && !tag.eq_ignore_ascii_case(&element.tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| element.has_class(c)) {
            return false;
        }
        self.attributes
            .iter()
            .all(|(name, expected)| match (element.attribute(name), expected) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
            })
    }

    fn parse(text: &str) -> Option<Self> {
        let mut compound = Compound::default();
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;

        let read_name = |start: usize| -> (String, usize) {
            let mut end = start;
            while end < chars.len() && !matches!(chars[end], '.' | '#' | '[') {
                end += 1;
            }
            (chars[start..end].iter().collect(), end)
        };

        if i < chars.len() && !matches!(chars[i], '.' | '#' | '[') {
            let (tag, next) = read_name(i);
            compound.tag = Some(tag);
            i = next;
        }
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    let (class, next) = read_name(i + 1);
                    if class.is_empty() {
                        return None;
                    }
                    compound.classes.push(class);
                    i = next;
                }
                '#' => {
                    let (id, next) = read_name(i + 1);
                    if id.is_empty() {
                        return None;
                    }
                    compound.id = Some(id);
                    i = next;
                }
                '[' => {
                    let close = chars[i..].iter().position(|c| *c == ']')? + i;
                    let inner: String = chars[i + 1..close].iter().collect();
                    let attribute = match inner.split_once('=') {
                        Some((name, value)) => (
                            name.trim().to_string(),
                            Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()),
                        ),
                        None => (inner.trim().to_string(), None),
                    };
                    if attribute.0.is_empty() {
                        return None;
                    }
                    compound.attributes.push(attribute);
                    i = close + 1;
                }
                _ => return None,
            }
        }
        Some(compound)
    }
}

/// A comma-separated list of descendant-combinator chains.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    groups: Vec<Vec<Compound>>,
}

impl Selector {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `ancestors` runs from the outermost element down to the parent.
    pub fn matches(&self, element: &Element, ancestors: &[&Element]) -> bool {
        self.groups.iter().any(|chain| {
            let Some((last, rest)) = chain.split_last() else {
                return false;
            };
            if !last.matches(element) {
                return false;
            }
            let mut upper = ancestors.len();
            for compound in rest.iter().rev() {
                match ancestors[..upper].iter().rposition(|a| compound.matches(a)) {
                    Some(found) => upper = found,
                    None => return false,
                }
            }
            true
        })
    }
}

/// Splits on `separator` outside of `[...]`.
fn split_outside_brackets(text: &str, is_separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0 && is_separator(c) {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let invalid = || SelectorError {
            selector: source.to_string(),
        };
        let mut groups = Vec::new();
        for group in split_outside_brackets(source, |c| c == ',') {
            let chain = split_outside_brackets(&group, char::is_whitespace)
                .into_iter()
                .filter(|step| !step.is_empty())
                .map(|step| Compound::parse(&step).ok_or_else(invalid))
                .collect::<Result<Vec<_>, _>>()?;
            if chain.is_empty() {
                return Err(invalid());
            }
            groups.push(chain);
        }
        Ok(Self {
            source: source.to_string(),
            groups,
        })
    }
}

/// Process-wide page state shared by all instances: attached roots and
/// installed stylesheets, each keyed by owning instance id.
#[derive(Default)]
pub struct Document {
    attached: DashSet<String>,
    stylesheets: DashMap<String, String>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, id: &str) {
        self.attached.insert(id.to_string());
    }

    pub fn detach(&self, id: &str) -> bool {
        self.attached.remove(id).is_some()
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.attached.contains(id)
    }

    pub fn add_stylesheet(&self, owner: &str, css: String) {
        debug!("Installing stylesheet for {}", owner);
        self.stylesheets.insert(owner.to_string(), css);
    }

    pub fn remove_stylesheet(&self, owner: &str) -> bool {
        self.stylesheets.remove(owner).is_some()
    }

    pub fn stylesheet(&self, owner: &str) -> Option<String> {
        self.stylesheets.get(owner).map(|css| css.clone())
    }

    pub fn stylesheet_count(&self) -> usize {
        self.stylesheets.len()
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    pub fn clear(&self) {
        self.attached.clear();
        self.stylesheets.clear();
    }
}
