// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Name-keyed registry of per-database resources.
//!
//! Looking up a name that was never registered fails with
//! [`SdkError::MissingClient`], which keeps "never connected" distinct from
//! "connected but empty".

use std::collections::HashMap;

use crate::error::{Result, SdkError};

/// A map from logical database name to a live resource.
#[derive(Debug)]
pub struct DbRegistry<V> {
    entries: HashMap<String, V>,
}

impl<V> DbRegistry<V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `value` under `name`, returning any previous value.
    pub fn insert(&mut self, name: &str, value: V) -> Option<V> {
        self.entries.insert(name.to_string(), value)
    }

    /// The resource for `name`.
    pub fn get(&self, name: &str) -> Result<&V> {
        self.entries
            .get(name)
            .ok_or_else(|| SdkError::MissingClient(name.to_string()))
    }

    /// The resource for `name`, mutably.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut V> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| SdkError::MissingClient(name.to_string()))
    }

    /// Remove and return the resource for `name`, if any.
    pub fn remove(&mut self, name: &str) -> Option<V> {
        self.entries.remove(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for DbRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_client() {
        let registry: DbRegistry<u32> = DbRegistry::new();
        match registry.get("APPL_DB") {
            Err(SdkError::MissingClient(name)) => assert_eq!(name, "APPL_DB"),
            other => panic!("expected MissingClient, got: {:?}", other),
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let mut registry = DbRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.insert("APPL_DB", 1).is_none());
        assert_eq!(registry.insert("APPL_DB", 2), Some(1));
        assert_eq!(*registry.get("APPL_DB").unwrap(), 2);

        *registry.get_mut("APPL_DB").unwrap() = 3;
        assert!(registry.contains("APPL_DB"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["APPL_DB"]);

        assert_eq!(registry.remove("APPL_DB"), Some(3));
        assert_eq!(registry.remove("APPL_DB"), None);
        assert!(matches!(registry.get_mut("APPL_DB"), Err(SdkError::MissingClient(_))));
    }
}
