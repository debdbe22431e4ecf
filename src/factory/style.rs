//! Scoped stylesheet synthesis.

use super::definition::{Rules, Styles};

/// `backgroundColor` → `background-color`.
pub fn css_property(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn declarations(rules: &Rules) -> String {
    rules
        .iter()
        .map(|(property, value)| format!("  {}: {};", css_property(property), value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the stylesheet for one instance. Every selector is qualified by
/// `#<scope>`. An empty `base` produces no rule; named variants, states and
/// breakpoints always produce one each.
pub fn synthesize(styles: &Styles, scope: &str) -> String {
    let mut css = String::new();
    if !styles.base.is_empty() {
        css.push_str(&format!("#{} {{\n{}\n}}\n", scope, declarations(&styles.base)));
    }
    for (variant, rules) in &styles.variants {
        css.push_str(&format!(
            "#{}.{} {{\n{}\n}}\n",
            scope,
            variant,
            declarations(rules)
        ));
    }
    for (state, rules) in &styles.states {
        css.push_str(&format!(
            "#{}[data-state=\"{}\"] {{\n{}\n}}\n",
            scope,
            state,
            declarations(rules)
        ));
    }
    for (condition, rules) in &styles.responsive {
        css.push_str(&format!(
            "@media {} {{\n#{} {{\n{}\n}}\n}}\n",
            condition,
            scope,
            declarations(rules)
        ));
    }
    css
}
