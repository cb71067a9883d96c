//! # Lexmac Macro System
//!
//! Lexical macros rewrite syntax trees before anything else sees them. A macro is
//! registered under a name (optionally inside a namespace) and is offered every
//! node whose head carries that name. It either declines or returns a
//! replacement.
//!
//! ## Module Structure
//!
//! - **`types`**: entries, modes, priorities, the callable signature
//! - **`registry`**: the name-keyed macro table
//! - **`scope`**: per-block sets of open namespaces
//! - **`builtins`**: `#import`, `#importMacros`, `#unimportMacros`, `#noLexicalMacros`
//! - **`messages`**: what gets reported after a group of macros saw a node
//! - **`cancel`**: cooperative cancellation
//! - **`expander`**: the engine itself
//!
//! ## Core Principles
//!
//! - **Purely syntactic**: macros see nodes and a diagnostics sink, nothing else.
//! - **Lexically scoped**: a namespace opened inside `{ ... }` closes with the block.
//! - **Bounded**: every expansion spends budget, so runaway macros terminate.

pub mod builtins;
pub mod cancel;
pub mod expander;
mod messages;
pub mod registry;
pub mod scope;
pub mod types;

pub use builtins::{builtin_macros, inject_builtins, namespace_symbol};
pub use cancel::CancellationToken;
pub use expander::ExpansionTask;
pub use registry::MacroTable;
pub use scope::{OpenSet, ScopeStack};
pub use types::{MacroContext, MacroEntry, MacroError, MacroFn, MacroMode, MacroPriority, MacroResult, Reprocess};

/// Default expansion budget per input.
pub const DEFAULT_MAX_EXPANSIONS: u32 = 0xFFFF;
