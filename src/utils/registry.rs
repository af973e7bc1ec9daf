use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Scoped key/value diagnostics sink.
///
/// Child registries share the parent's store and prefix their keys with the
/// scope path, e.g. `physics_engine.total_timer`. Clones are cheap handles to
/// the same store. The registry is a reporting channel only; the engine never
/// reads its own values back as control input.
#[derive(Debug, Clone)]
pub struct Registry {
    scope: String,
    values: Arc<RwLock<BTreeMap<String, f64>>>,
}

impl Registry {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            values: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// A nested scope sharing this registry's store.
    pub fn child(&self, name: &str) -> Registry {
        Registry {
            scope: format!("{}.{}", self.scope, name),
            values: Arc::clone(&self.values),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn key(&self, name: &str) -> String {
        format!("{}.{}", self.scope, name)
    }

    pub fn set(&self, name: &str, value: f64) {
        self.values.write().insert(self.key(name), value);
    }

    /// Adds `delta` to a counter (starting at zero) and returns the new value.
    pub fn increment(&self, name: &str, delta: f64) -> f64 {
        let mut values = self.values.write();
        let slot = values.entry(self.key(name)).or_insert(0.0);
        *slot += delta;
        *slot
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.read().get(&self.key(name)).copied()
    }

    /// All values under this scope, keyed by their path relative to the scope.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        let prefix = format!("{}.", self.scope);
        self.values
            .read()
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k[prefix.len()..].to_string(), *v))
            .collect()
    }
}
