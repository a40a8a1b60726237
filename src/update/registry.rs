//! Registry resolving update rules by name.

use crate::update::rule::UpdateRule;
use std::collections::HashMap;
use std::sync::Arc;

/// Name → rule lookup used by the serving side of a pushed gradient.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Arc<dyn UpdateRule>>,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule under its own name, replacing any previous one.
    pub fn register(&mut self, rule: Arc<dyn UpdateRule>) {
        self.rules.insert(rule.name().to_string(), rule);
    }

    /// Builder form of [`RuleRegistry::register`].
    pub fn with_rule(mut self, rule: Arc<dyn UpdateRule>) -> Self {
        self.register(rule);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn UpdateRule>> {
        self.rules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.rules.keys().collect();
        names.sort();
        f.debug_struct("RuleRegistry").field("rules", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::Sgd;

    #[test]
    fn test_register_and_lookup() {
        let registry = RuleRegistry::new().with_rule(Arc::new(Sgd::new(0.1)));
        assert!(registry.contains("sgd"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("sgd").map(|r| r.name().to_string()), Some("sgd".to_string()));
        assert!(registry.get("adam").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = RuleRegistry::new();
        registry.register(Arc::new(Sgd::new(0.1)));
        registry.register(Arc::new(Sgd::new(0.2)));
        assert_eq!(registry.len(), 1);
    }
}
