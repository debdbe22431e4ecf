use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::factory::dom::Element;

type Constructor = Arc<dyn Fn() -> Element + Send + Sync>;

/// A constructible element kind.
#[derive(Clone)]
pub struct ElementClass {
    constructor: Constructor,
}

impl ElementClass {
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn() -> Element + Send + Sync + 'static,
    {
        Self {
            constructor: Arc::new(constructor),
        }
    }

    /// An element class whose instances are bare `<tag>` elements.
    pub fn plain(tag: &str) -> Self {
        let tag = tag.to_string();
        Self::new(move || Element::new(&tag))
    }

    pub fn construct(&self) -> Element {
        (self.constructor)()
    }
}

impl fmt::Debug for ElementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ElementClass")
    }
}

/// Global table of defined element names, the analogue of a browser's
/// custom element registry. A name can be defined once; redefinition is a
/// no-op that reports `false`.
#[derive(Default)]
pub struct ElementRegistry {
    classes: DashMap<String, ElementClass>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, name: &str, class: ElementClass) -> bool {
        if self.classes.contains_key(name) {
            return false;
        }
        debug!("Defining element {}", name);
        self.classes.insert(name.to_string(), class);
        true
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<ElementClass> {
        self.classes.get(name).map(|class| class.clone())
    }

    /// Removes a definition. Browsers cannot do this; it exists so hosts and
    /// tests can simulate a definition disappearing underneath the registry.
    pub fn undefine(&self, name: &str) -> bool {
        self.classes.remove(name).is_some()
    }

    /// Builds a fresh element of a defined kind, tagged with its name.
    pub fn construct(&self, name: &str) -> Option<Element> {
        self.get(name).map(|class| {
            let mut element = class.construct();
            element.tag = name.to_string();
            element
        })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
