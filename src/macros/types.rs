//! Fundamental types of the macro system.
//!
//! This module has no dependencies on other macro modules apart from the scope
//! stack that [`MacroContext`] hands out.
//!
//! ## Ownership
//!
//! - [`MacroEntry`] is cheap to clone: the callable is shared through an `Arc`
//! - Two entries denote the same macro when they share the same callable
//!   allocation, which is how re-registration is detected
//! - [`MacroContext`] only borrows; it lives for a single macro invocation

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::{Node, Symbol};
use crate::diagnostics::{Cancelled, MessageSink, Severity};
use crate::macros::scope::ScopeStack;

// ============================================================================
// MODES
// ============================================================================

/// Evaluation tier among macros that share a name. Higher tiers are tried
/// first; a lower tier only runs if every macro in the higher tiers declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MacroPriority {
    FallbackMin,
    Fallback,
    InternalFallback,
    #[default]
    Normal,
    InternalOverride,
    Override,
    OverrideMax,
}

/// What happens to a macro's output after it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reprocess {
    /// Run the whole dispatch again on the output, so its own head may match
    /// another macro. Output equal to the input only has its children expanded.
    #[default]
    Normal,
    /// Expand only the output's children.
    ChildrenAfter,
    /// Use the output verbatim for the rest of this pass.
    None,
}

/// Mode flags of a registered macro.
///
/// ```rust
/// use lexmac::macros::{MacroMode, MacroPriority, Reprocess};
/// let mode = MacroMode::normal().passive().with_priority(MacroPriority::Override);
/// assert_eq!(mode.reprocess, Reprocess::Normal);
/// assert!(mode.passive);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacroMode {
    pub reprocess: Reprocess,
    /// Expand the input's children before invoking the macro.
    pub children_before: bool,
    /// Declining is expected and is not reported for macro-style calls.
    pub passive: bool,
    /// Another macro producing the same output is not ambiguous.
    pub allow_duplicates: bool,
    pub priority: MacroPriority,
}

impl MacroMode {
    pub const fn normal() -> Self {
        Self {
            reprocess: Reprocess::Normal,
            children_before: false,
            passive: false,
            allow_duplicates: false,
            priority: MacroPriority::Normal,
        }
    }

    pub const fn no_reprocessing() -> Self {
        Self::normal().with_reprocess(Reprocess::None)
    }

    pub const fn children_after() -> Self {
        Self::normal().with_reprocess(Reprocess::ChildrenAfter)
    }

    pub const fn with_reprocess(mut self, reprocess: Reprocess) -> Self {
        self.reprocess = reprocess;
        self
    }

    pub const fn process_children_before(mut self) -> Self {
        self.children_before = true;
        self
    }

    pub const fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    pub const fn allow_duplicates(mut self) -> Self {
        self.allow_duplicates = true;
        self
    }

    pub const fn with_priority(mut self, priority: MacroPriority) -> Self {
        self.priority = priority;
        self
    }
}

// ============================================================================
// CALLABLES
// ============================================================================

/// Failure reported by a macro callable.
#[derive(Debug, Error)]
pub enum MacroError {
    /// The macro hit a problem; reported as an Error diagnostic and treated as
    /// a decline.
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
    /// Abort processing of the current input.
    #[error("macro processing was cancelled")]
    Cancelled,
}

impl MacroError {
    pub fn failed(message: impl Into<String>) -> Self {
        MacroError::Failed(message.into())
    }
}

impl From<Cancelled> for MacroError {
    fn from(_: Cancelled) -> Self {
        MacroError::Cancelled
    }
}

/// `Ok(Some(node))` accepts with a replacement, `Ok(None)` declines.
pub type MacroResult = Result<Option<Node>, MacroError>;

/// A macro: node in, replacement (or decline) out.
pub type MacroFn = Arc<dyn Fn(&Node, &mut MacroContext<'_>) -> MacroResult + Send + Sync>;

/// Everything a macro may touch besides its input: a diagnostics sink and the
/// scope stack of the task running it.
pub struct MacroContext<'a> {
    sink: &'a dyn MessageSink,
    scopes: &'a mut ScopeStack,
}

impl<'a> MacroContext<'a> {
    pub fn new(sink: &'a dyn MessageSink, scopes: &'a mut ScopeStack) -> Self {
        Self { sink, scopes }
    }

    pub fn sink(&self) -> &dyn MessageSink {
        self.sink
    }

    pub fn is_enabled(&self, severity: Severity) -> bool {
        self.sink.is_enabled(severity)
    }

    pub fn write(&self, severity: Severity, context: &Node, text: impl Into<String>) {
        self.sink.write(severity, context, text.into());
    }

    pub fn scopes(&self) -> &ScopeStack {
        self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut ScopeStack {
        self.scopes
    }
}

// ============================================================================
// REGISTRATION RECORD
// ============================================================================

/// A registered macro.
///
/// ```rust
/// use lexmac::ast::Node;
/// use lexmac::macros::{MacroEntry, MacroMode};
/// let entry = MacroEntry::new("twice", |node, _ctx| {
///     Ok(Some(Node::call_sym("pair", [node.clone(), node.clone()])))
/// })
/// .in_namespace("Demo")
/// .with_mode(MacroMode::children_after());
/// assert_eq!(entry.label(), "Demo.twice");
/// ```
#[derive(Clone)]
pub struct MacroEntry {
    /// `None` is the global namespace, which is always visible.
    pub namespace: Option<Symbol>,
    pub name: Symbol,
    pub mode: MacroMode,
    label: Option<Arc<str>>,
    /// Type path of the callable, when it was known at construction.
    origin: Option<&'static str>,
    callable: MacroFn,
}

impl MacroEntry {
    pub fn new<F>(name: impl Into<Symbol>, callable: F) -> Self
    where
        F: Fn(&Node, &mut MacroContext<'_>) -> MacroResult + Send + Sync + 'static,
    {
        Self {
            origin: Some(std::any::type_name::<F>()),
            ..Self::from_fn(name, Arc::new(callable))
        }
    }

    /// Wraps an existing callable. Entries built from clones of one `MacroFn`
    /// count as the same macro.
    pub fn from_fn(name: impl Into<Symbol>, callable: MacroFn) -> Self {
        Self {
            namespace: None,
            name: name.into(),
            mode: MacroMode::normal(),
            label: None,
            origin: None,
            callable,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<Symbol>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_mode(mut self, mode: MacroMode) -> Self {
        self.mode = mode;
        self
    }

    /// Overrides the name diagnostics use for this macro.
    pub fn labelled(mut self, label: impl AsRef<str>) -> Self {
        self.label = Some(Arc::from(label.as_ref()));
        self
    }

    /// Display name used in diagnostics: the explicit label, else the path of
    /// the function implementing the macro, else [`qualified_name`](Self::qualified_name)
    /// (closures have no path of their own).
    pub fn label(&self) -> String {
        if let Some(label) = &self.label {
            return label.to_string();
        }
        match self.origin {
            Some(path) if !path.contains("{{closure}}") => path.to_string(),
            _ => self.qualified_name(),
        }
    }

    /// `namespace.name`, or just `name` for a global macro.
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.to_string(),
        }
    }

    pub fn callable(&self) -> &MacroFn {
        &self.callable
    }

    pub fn same_callable(&self, other: &MacroEntry) -> bool {
        Arc::as_ptr(&self.callable) as *const () == Arc::as_ptr(&other.callable) as *const ()
    }

    pub fn invoke(&self, node: &Node, ctx: &mut MacroContext<'_>) -> MacroResult {
        (self.callable)(node, ctx)
    }
}

impl fmt::Debug for MacroEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroEntry")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("label", &self.label())
            .field("mode", &self.mode)
            .finish()
    }
}
