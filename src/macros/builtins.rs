//! Built-in macros.
//!
//! These manage namespace scopes and are injected into every expansion task's
//! private copy of the macro table. They live in the global namespace.
//!
//! | Name               | Mode                | Effect                                  |
//! |--------------------|---------------------|-----------------------------------------|
//! | `{}`               | passive             | none (the engine scopes the block)      |
//! | `#import`          | passive             | opens namespaces, keeps the node        |
//! | `#importMacros`    | normal              | opens namespaces, removes the node      |
//! | `#unimportMacros`  | passive             | closes namespaces, keeps the node       |
//! | `#noLexicalMacros` | no reprocessing     | protects its arguments from expansion   |

use once_cell::sync::Lazy;

use crate::ast::{symbol, Node, Symbol};
use crate::diagnostics::Severity;
use crate::macros::registry::MacroTable;
use crate::macros::types::{MacroContext, MacroEntry, MacroMode, MacroResult};

// ===================================================================================================
// REGISTRY: Built-in Macro Registration
// ===================================================================================================

// One allocation per callable for the whole process, so injecting the list
// into a table that already holds it is a no-op.
static BUILTINS: Lazy<Vec<MacroEntry>> = Lazy::new(|| {
    vec![
        MacroEntry::new(&*symbol::BRACES, on_braces)
            .with_mode(MacroMode::normal().passive())
            .labelled("builtin.braces"),
        MacroEntry::new(&*symbol::IMPORT, on_import)
            .with_mode(MacroMode::normal().passive())
            .labelled("builtin.import"),
        MacroEntry::new(&*symbol::IMPORT_MACROS, on_import_macros)
            .with_mode(MacroMode::normal())
            .labelled("builtin.importMacros"),
        MacroEntry::new(&*symbol::UNIMPORT_MACROS, on_unimport_macros)
            .with_mode(MacroMode::normal().passive())
            .labelled("builtin.unimportMacros"),
        MacroEntry::new(&*symbol::NO_LEXICAL_MACROS, on_no_lexical_macros)
            .with_mode(MacroMode::no_reprocessing())
            .labelled("builtin.noLexicalMacros"),
    ]
});

/// The built-in macro entries.
pub fn builtin_macros() -> &'static [MacroEntry] {
    &BUILTINS
}

/// Registers the built-in macros in `table`.
pub fn inject_builtins(table: &mut MacroTable) {
    table.add_macros(BUILTINS.iter().cloned());
}

/// The namespace named by an argument of `#import` and friends: its printed
/// form, so `A.B` names the namespace `"A.B"`.
pub fn namespace_symbol(node: &Node) -> Symbol {
    Symbol::from(node.to_string())
}

// ===================================================================================================
// SCOPE MACROS
// ===================================================================================================

/// Blocks are scoped by the engine before any macro runs; nothing to do here.
fn on_braces(_node: &Node, _ctx: &mut MacroContext<'_>) -> MacroResult {
    Ok(None)
}

fn on_import(node: &Node, ctx: &mut MacroContext<'_>) -> MacroResult {
    for arg in node.args() {
        ctx.scopes_mut().open_import(namespace_symbol(arg));
    }
    Ok(None)
}

fn on_import_macros(node: &Node, ctx: &mut MacroContext<'_>) -> MacroResult {
    on_import(node, ctx)?;
    Ok(Some(Node::splice([])))
}

fn on_unimport_macros(node: &Node, ctx: &mut MacroContext<'_>) -> MacroResult {
    for arg in node.args() {
        let namespace = namespace_symbol(arg);
        if !ctx.scopes_mut().close_import(&namespace) && ctx.is_enabled(Severity::Debug) {
            ctx.write(
                Severity::Debug,
                arg,
                format!("Namespace not found to remove: {}", namespace),
            );
        }
    }
    Ok(None)
}

// ===================================================================================================
// PROTECTION
// ===================================================================================================

/// `#noLexicalMacros(a, b)` becomes `#splice(a, b)`, returned without further
/// expansion.
fn on_no_lexical_macros(node: &Node, _ctx: &mut MacroContext<'_>) -> MacroResult {
    if !node.is_call() {
        return Ok(None);
    }
    Ok(Some(node.with_target(Node::id(&*symbol::SPLICE))))
}
