use dashmap::{DashMap, DashSet};
use tracing::{debug, warn};

/// Maps logical symbols such as `wb.color-bar.js` to their runtime locations.
///
/// Known symbols always resolve to an absolute path. Unknown symbols resolve
/// to themselves so callers can still try the raw name as a location.
#[derive(Default)]
pub struct SymbolTable {
    symbols: DashMap<String, String>,
    resolve_cache: DashMap<String, String>,
    warned: DashSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols<I, K, V>(symbols: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table = Self::new();
        for (symbol, path) in symbols {
            table.register(symbol, path);
        }
        table
    }

    pub fn register(&self, symbol: impl Into<String>, path: impl Into<String>) {
        let symbol = symbol.into();
        let path = path.into();
        debug!("Registering symbol {} -> {}", symbol, path);
        self.resolve_cache.remove(&symbol);
        self.symbols.insert(symbol, path);
    }

    pub fn resolve(&self, symbol: &str) -> String {
        if let Some(cached) = self.resolve_cache.get(symbol) {
            return cached.clone();
        }

        let resolved = match self.symbols.get(symbol) {
            Some(path) if path.starts_with('/') => path.clone(),
            Some(path) => format!("/{}", path.as_str()),
            None => {
                if self.warned.insert(symbol.to_string()) {
                    warn!("Unknown symbol '{}', returning as-is", symbol);
                }
                symbol.to_string()
            }
        };

        self.resolve_cache
            .insert(symbol.to_string(), resolved.clone());
        resolved
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn clear_cache(&self) {
        self.resolve_cache.clear();
    }

    /// Symbol under which a module's code is published, `wb-color-bar` → `wb.color-bar.js`.
    pub fn module_symbol(name: &str) -> String {
        format!("{}.js", name.replacen("wb-", "wb.", 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_symbols_are_absolute() {
        let table = SymbolTable::with_symbols([
            ("wb.color-bar.js", "components/wb-color-bar/wb-color-bar.js"),
            ("wb.button.js", "/components/wb-button/wb-button.js"),
        ]);
        assert_eq!(
            table.resolve("wb.color-bar.js"),
            "/components/wb-color-bar/wb-color-bar.js"
        );
        assert_eq!(table.resolve("wb.button.js"), "/components/wb-button/wb-button.js");
    }

    #[test]
    fn test_unknown_symbol_resolves_to_itself() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve("wb.nothing.js"), "wb.nothing.js");
    }

    #[test]
    fn test_register_replaces_cached_resolution() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve("wb.x.js"), "wb.x.js");
        table.register("wb.x.js", "/x.js");
        assert_eq!(table.resolve("wb.x.js"), "/x.js");
    }

    #[test]
    fn test_module_symbol() {
        assert_eq!(SymbolTable::module_symbol("wb-color-bar"), "wb.color-bar.js");
        assert_eq!(SymbolTable::module_symbol("badge"), "badge.js");
    }
}
