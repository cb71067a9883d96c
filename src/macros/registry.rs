//! Macro table for storage and lookup of macro entries.
//!
//! # Features
//! - Entries are grouped by name; within a name, registration order is kept.
//! - Several entries may share a name. Registering the same callable under the
//!   same name twice is a no-op.
//! - Nothing is ever removed. Hiding macros is a scope operation
//!   (`#unimportMacros`), not a table mutation.
//!
//! # Sharing
//! The table is built on `im` persistent maps, so `clone` is O(1) and a clone
//! that registers extra entries only copies the path it touches. Every
//! expansion task takes its own clone and injects the built-in macros into it.
//!
//! # Summary Table
//! | Method          | Visibility rule                                   |
//! |-----------------|---------------------------------------------------|
//! | `lookup`        | global entries plus entries of open namespaces    |
//! | `lookup_in`     | entries of exactly one namespace (`A.B(...)`)     |

use crate::ast::Symbol;
use crate::macros::scope::OpenSet;
use crate::macros::types::MacroEntry;

/// Name-keyed, append-only macro table.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: im::HashMap<Symbol, im::Vector<MacroEntry>>,
}

impl MacroTable {
    /// Creates a new, empty table.
    ///
    /// ```rust
    /// use lexmac::macros::MacroTable;
    /// let table = MacroTable::new();
    /// assert!(table.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` to the list for its name.
    ///
    /// # Returns
    /// `false` if the same callable was already registered under this name.
    pub fn register(&mut self, entry: MacroEntry) -> bool {
        let cases = self
            .macros
            .entry(entry.name.clone())
            .or_insert_with(im::Vector::new);
        if cases.iter().any(|existing| existing.same_callable(&entry)) {
            return false;
        }
        cases.push_back(entry);
        true
    }

    /// Registers every entry; returns whether any was new.
    pub fn add_macros(&mut self, entries: impl IntoIterator<Item = MacroEntry>) -> bool {
        let mut any = false;
        for entry in entries {
            any |= self.register(entry);
        }
        any
    }

    /// Entries named `name` that are global or belong to an open namespace,
    /// in registration order.
    pub fn lookup(&self, open_namespaces: &OpenSet, name: &Symbol) -> Vec<MacroEntry> {
        self.filter(name, |entry| match &entry.namespace {
            None => true,
            Some(ns) => open_namespaces.contains(ns),
        })
    }

    /// Entries named `name` registered in exactly `namespace`.
    pub fn lookup_in(&self, namespace: &Symbol, name: &Symbol) -> Vec<MacroEntry> {
        self.filter(name, |entry| entry.namespace.as_ref() == Some(namespace))
    }

    fn filter(&self, name: &Symbol, keep: impl Fn(&MacroEntry) -> bool) -> Vec<MacroEntry> {
        match self.macros.get(name) {
            Some(cases) => cases.iter().filter(|entry| keep(entry)).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Checks if any entry is registered under `name`.
    pub fn contains(&self, name: &Symbol) -> bool {
        self.macros.contains_key(name)
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.macros.values().map(|cases| cases.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// All entries, sorted by name and then registration order.
    pub fn entries(&self) -> Vec<MacroEntry> {
        let mut names: Vec<&Symbol> = self.macros.keys().collect();
        names.sort();
        names
            .into_iter()
            .flat_map(|name| self.macros[name].iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;
    use crate::macros::types::{MacroContext, MacroEntry, MacroFn, MacroResult};
    use std::sync::Arc;

    fn decline() -> MacroFn {
        Arc::new(|_: &Node, _: &mut MacroContext<'_>| -> MacroResult { Ok(None) })
    }

    fn open(names: &[&str]) -> OpenSet {
        names.iter().map(|n| Symbol::new(n)).collect()
    }

    #[test]
    fn register_deduplicates_by_callable() {
        let mut table = MacroTable::new();
        let f = decline();
        assert!(table.register(MacroEntry::from_fn("X", f.clone())));
        assert!(!table.register(MacroEntry::from_fn("X", f.clone())));
        assert!(table.register(MacroEntry::from_fn("Y", f)));
        assert!(table.register(MacroEntry::from_fn("X", decline())));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn lookup_respects_open_namespaces_and_order() {
        let mut table = MacroTable::new();
        table.register(MacroEntry::from_fn("Foo", decline()).labelled("global"));
        table.register(MacroEntry::from_fn("Foo", decline()).in_namespace("N").labelled("in-n"));
        table.register(MacroEntry::from_fn("Foo", decline()).in_namespace("M").labelled("in-m"));

        let name = Symbol::new("Foo");
        let labels = |found: Vec<MacroEntry>| found.iter().map(|e| e.label()).collect::<Vec<_>>();
        assert_eq!(labels(table.lookup(&open(&[]), &name)), vec!["global"]);
        assert_eq!(labels(table.lookup(&open(&["M", "N"]), &name)), vec!["global", "in-n", "in-m"]);
        assert_eq!(labels(table.lookup_in(&Symbol::new("M"), &name)), vec!["in-m"]);
        assert!(table.lookup(&open(&["N"]), &Symbol::new("Bar")).is_empty());
    }

    #[test]
    fn clones_do_not_see_later_registrations() {
        let mut base = MacroTable::new();
        base.register(MacroEntry::from_fn("A", decline()));
        let mut task_copy = base.clone();
        task_copy.register(MacroEntry::from_fn("B", decline()));
        assert!(task_copy.contains(&Symbol::new("B")));
        assert!(!base.contains(&Symbol::new("B")));
        assert_eq!(base.len(), 1);
    }
}
