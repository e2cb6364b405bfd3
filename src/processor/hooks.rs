//! Named post-processing hooks.
//!
//! Configuration binds hook names to output columns and fields; names are
//! resolved against a [`HookRegistry`] when the configuration is validated.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A text transformation.
pub type Hook = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Map from hook name to function.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: IndexMap<String, Hook>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in hooks: `trim`, `remove_spaces`, `upper`, `lower`,
    /// `digits_only` and `strip_symbols`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("trim", |s| s.trim().to_string());
        registry.register("remove_spaces", |s| s.chars().filter(|c| !c.is_whitespace()).collect());
        registry.register("upper", |s| s.to_uppercase());
        registry.register("lower", |s| s.to_lowercase());
        registry.register("digits_only", |s| s.chars().filter(|c| c.is_ascii_digit()).collect());
        registry.register("strip_symbols", |s| {
            s.chars().filter(|c| !crate::matching::text::is_symbol(*c)).collect()
        });
        registry
    }

    /// Register a hook; an existing hook with the same name is replaced.
    pub fn register<F>(&mut self, name: &str, hook: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.hooks.insert(name.to_string(), Arc::new(hook));
    }

    /// True when a hook with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.keys().map(|k| k.as_str())
    }

    /// Apply the named hooks in order. Unknown names are skipped with a warning.
    pub fn apply(&self, names: &[String], text: &str) -> String {
        names.iter().fold(text.to_string(), |acc, name| match self.hooks.get(name) {
            Some(hook) => hook(&acc),
            None => {
                log::warn!("unknown hook '{}' skipped", name);
                acc
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_apply_in_order() {
        let hooks = HookRegistry::with_builtins();
        let names = vec!["trim".to_string(), "upper".to_string()];
        assert_eq!(hooks.apply(&names, "  ab c "), "AB C");
        let names = vec!["digits_only".to_string()];
        assert_eq!(hooks.apply(&names, "USD 1,200"), "1200");
    }

    #[test]
    fn test_custom_hook() {
        let mut hooks = HookRegistry::new();
        hooks.register("reverse", |s| s.chars().rev().collect());
        assert!(hooks.contains("reverse"));
        assert!(!hooks.contains("trim"));
        assert_eq!(hooks.apply(&["reverse".into()], "abc"), "cba");
    }
}
