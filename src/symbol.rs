//! Symbol tables: bidirectional id ↔ object interning.
//!
//! Constants and features are interned into a [`SymbolTable`] once and then
//! referred to by small dense integer ids. Tables are append-only and backed
//! by `DashMap`, so one table can be shared through an `Arc` by every proof
//! running concurrently; a symbol first seen by one proof gets the same id in
//! all of them.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A feature name, e.g. `id(restart)` or `link(alice)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Feature(String);

impl Feature {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Feature {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Feature {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Append-only bidirectional symbol table.
///
/// Ids are allocated densely from 0 in first-seen order. Interning the same
/// symbol twice, from any thread, returns the same id.
#[derive(Debug)]
pub struct SymbolTable<T: Eq + Hash + Clone> {
    /// Forward map: symbol → id (source of truth for allocation).
    to_id: DashMap<T, usize>,
    /// Reverse map: id → symbol.
    from_id: DashMap<usize, T>,
    next: AtomicUsize,
}

/// Table of program constants (`alice`, `bob`, ...).
pub type ConstantTable = SymbolTable<String>;

/// Table of edge features.
pub type FeatureTable = SymbolTable<Feature>;

impl<T: Eq + Hash + Clone> SymbolTable<T> {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            to_id: DashMap::new(),
            from_id: DashMap::new(),
            next: AtomicUsize::new(0),
        }
    }

    /// Intern a symbol, returning its id.
    pub fn intern(&self, symbol: T) -> usize {
        if let Some(id) = self.to_id.get(&symbol) {
            return *id.value();
        }
        // The entry lock serializes allocation for this key, so two threads
        // racing on the same new symbol see one id.
        let key = symbol.clone();
        let entry = self.to_id.entry(symbol).or_insert_with(|| {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            self.from_id.insert(id, key);
            id
        });
        *entry.value()
    }

    /// Look up the id of a symbol without interning it.
    pub fn id_of<Q>(&self, symbol: &Q) -> Option<usize>
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.to_id.get(symbol).map(|r| *r.value())
    }

    /// Look up the symbol for an id.
    pub fn symbol(&self, id: usize) -> Option<T> {
        self.from_id.get(&id).map(|r| r.value().clone())
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.from_id.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.from_id.is_empty()
    }

    /// All symbols in id order.
    pub fn symbols(&self) -> Vec<T> {
        let mut entries: Vec<(usize, T)> = self
            .from_id
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, sym)| sym).collect()
    }
}

impl<T: Eq + Hash + Clone> Default for SymbolTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantTable {
    /// Resolve a constant id to its name, falling back to `#{id}`.
    pub fn resolve(&self, id: usize) -> String {
        self.symbol(id).unwrap_or_else(|| format!("#{id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn interning_is_idempotent() {
        let table = ConstantTable::new();
        let a = table.intern("alice".to_string());
        let b = table.intern("bob".to_string());
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(table.intern("alice".to_string()), a);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn lookup_both_directions() {
        let table = FeatureTable::new();
        let id = table.intern(Feature::new("id(restart)"));
        assert_eq!(table.id_of("id(restart)"), Some(id));
        assert_eq!(table.symbol(id), Some(Feature::new("id(restart)")));
        assert_eq!(table.id_of("missing"), None);
        assert!(table.symbol(99).is_none());
    }

    #[test]
    fn symbols_in_id_order() {
        let table = ConstantTable::new();
        for name in ["c", "a", "b"] {
            table.intern(name.to_string());
        }
        assert_eq!(table.symbols(), vec!["c", "a", "b"]);
    }

    #[test]
    fn concurrent_interning_agrees() {
        let table = Arc::new(ConstantTable::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| table.intern(format!("c{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(table.len(), 100);
        let mut ids = results[0].clone();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 100);
        assert_eq!(*ids.last().unwrap(), 99);
    }

    #[test]
    fn resolve_falls_back_to_id() {
        let table = ConstantTable::new();
        let id = table.intern("alice".to_string());
        assert_eq!(table.resolve(id), "alice");
        assert_eq!(table.resolve(42), "#42");
    }
}
