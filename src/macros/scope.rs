//! Namespace scopes.
//!
//! Each braced block gets a frame on the [`ScopeStack`]. A fresh frame owns
//! nothing and sees its parent's open namespaces; it copies them only when an
//! import or unimport first changes it. The copy is an `im` set, so it shares
//! structure with the parent.

use once_cell::sync::Lazy;

use crate::ast::Symbol;

/// Set of namespaces whose macros are visible.
pub type OpenSet = im::HashSet<Symbol>;

static NOTHING_OPEN: Lazy<OpenSet> = Lazy::new(OpenSet::new);

/// Stack of scope frames. `None` frames inherit from the nearest owned frame
/// below them. The root frame is never popped.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<Option<OpenSet>>,
}

impl ScopeStack {
    /// A stack with one root frame holding `pre_opened`.
    pub fn new(pre_opened: OpenSet) -> Self {
        Self {
            frames: vec![Some(pre_opened)],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Enters a scope that inherits the current open set.
    pub fn push(&mut self) {
        self.frames.push(None);
    }

    /// Leaves the innermost scope.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Namespaces open at the innermost scope.
    pub fn current(&self) -> &OpenSet {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.as_ref())
            .unwrap_or(&NOTHING_OPEN)
    }

    pub fn is_open(&self, namespace: &Symbol) -> bool {
        self.current().contains(namespace)
    }

    /// Whether the innermost frame owns its set rather than inheriting one.
    pub fn is_materialized(&self) -> bool {
        matches!(self.frames.last(), Some(Some(_)))
    }

    fn materialize(&mut self) -> &mut OpenSet {
        let inherited = self.current().clone();
        if self.frames.is_empty() {
            self.frames.push(None);
        }
        let top = self.frames.len() - 1;
        self.frames[top].get_or_insert(inherited)
    }

    /// Opens `namespace` in the innermost scope.
    pub fn open_import(&mut self, namespace: Symbol) {
        self.materialize().insert(namespace);
    }

    /// Closes `namespace` in the innermost scope.
    ///
    /// # Returns
    /// `false` if it was not open.
    pub fn close_import(&mut self, namespace: &Symbol) -> bool {
        self.materialize().remove(namespace).is_some()
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new(OpenSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Symbol {
        Symbol::new(name)
    }

    #[test]
    fn inner_frames_inherit_until_written() {
        let mut scopes = ScopeStack::new(OpenSet::unit(sym("Prelude")));
        scopes.push();
        assert!(!scopes.is_materialized());
        assert!(scopes.is_open(&sym("Prelude")));

        scopes.open_import(sym("N"));
        assert!(scopes.is_materialized());
        assert!(scopes.is_open(&sym("N")));
        assert!(scopes.is_open(&sym("Prelude")));

        scopes.pop();
        assert!(!scopes.is_open(&sym("N")));
        assert!(scopes.is_open(&sym("Prelude")));
    }

    #[test]
    fn close_import_reports_missing_namespaces() {
        let mut scopes = ScopeStack::new(OpenSet::unit(sym("N")));
        scopes.push();
        assert!(scopes.close_import(&sym("N")));
        assert!(!scopes.close_import(&sym("N")));
        scopes.pop();
        assert!(scopes.is_open(&sym("N")));
    }

    #[test]
    fn root_frame_survives_extra_pops() {
        let mut scopes = ScopeStack::new(OpenSet::unit(sym("N")));
        scopes.pop();
        scopes.pop();
        assert_eq!(scopes.depth(), 1);
        assert!(scopes.is_open(&sym("N")));
    }
}
