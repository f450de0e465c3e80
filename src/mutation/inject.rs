//! Late-bound target resolution for code under test.
//!
//! Test suites never hold the program they exercise. They ask the registry for
//! "the current `name`" on every run, and the controller swaps the entry for a
//! mutant variant around each bounded run.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Name-to-program map consulted by test code.
#[derive(Debug)]
pub struct TargetRegistry<V> {
    entries: RwLock<HashMap<String, Arc<V>>>,
}

impl<V> Default for TargetRegistry<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> TargetRegistry<V> {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the unmutated program under `name`.
    pub fn register(&self, name: impl Into<String>, program: Arc<V>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), program);
    }

    /// Current program bound to `name`.
    pub fn resolve(&self, name: &str) -> Option<Arc<V>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Bind `variant` to `name` until the returned guard drops, then restore
    /// whatever was bound before.
    pub fn inject(&self, name: &str, variant: Arc<V>) -> Injection<'_, V> {
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), variant);
        Injection {
            registry: self,
            name: name.to_string(),
            previous,
        }
    }
}

/// Scoped substitution created by [`TargetRegistry::inject`].
#[derive(Debug)]
#[must_use = "the substitution is reverted as soon as the guard is dropped"]
pub struct Injection<'a, V> {
    registry: &'a TargetRegistry<V>,
    name: String,
    previous: Option<Arc<V>>,
}

impl<V> Drop for Injection<'_, V> {
    fn drop(&mut self) {
        let mut entries = self
            .registry
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match self.previous.take() {
            Some(previous) => {
                entries.insert(std::mem::take(&mut self.name), previous);
            }
            None => {
                entries.remove(&self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injection_is_reverted_on_drop() {
        let registry = TargetRegistry::new();
        registry.register("calc", Arc::new("original"));

        {
            let _guard = registry.inject("calc", Arc::new("mutant-1"));
            assert_eq!(registry.resolve("calc").as_deref(), Some(&"mutant-1"));
        }
        assert_eq!(registry.resolve("calc").as_deref(), Some(&"original"));
    }

    #[test]
    fn injection_of_unknown_name_is_removed_afterwards() {
        let registry: TargetRegistry<u32> = TargetRegistry::new();
        {
            let _guard = registry.inject("ghost", Arc::new(7));
            assert_eq!(registry.resolve("ghost").as_deref(), Some(&7));
        }
        assert!(registry.resolve("ghost").is_none());
    }

    #[test]
    fn consecutive_injections_do_not_leak_into_each_other() {
        let registry = TargetRegistry::new();
        registry.register("calc", Arc::new(0));
        for n in 1..=3 {
            let _guard = registry.inject("calc", Arc::new(n));
            assert_eq!(registry.resolve("calc").as_deref(), Some(&n));
        }
        assert_eq!(registry.resolve("calc").as_deref(), Some(&0));
    }
}
