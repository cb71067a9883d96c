//! Symbols and the reserved names the engine treats specially.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// An immutable name. Cloning shares the underlying string; equality and
/// hashing compare contents.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(name: impl AsRef<str>) -> Self {
        Symbol(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Symbol(Arc::from(name))
    }
}

impl From<&Symbol> for Symbol {
    fn from(sym: &Symbol) -> Self {
        sym.clone()
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}", self.0)
    }
}

// ============================================================================
// RESERVED SYMBOLS
// ============================================================================

/// Head of a splice marker: its arguments are inlined into the enclosing list.
pub static SPLICE: Lazy<Symbol> = Lazy::new(|| Symbol::new("#splice"));

/// Head of a braced block, the lexical scope boundary for imports.
pub static BRACES: Lazy<Symbol> = Lazy::new(|| Symbol::new("{}"));

/// Head of a two-part qualified name `A.B`.
pub static DOT: Lazy<Symbol> = Lazy::new(|| Symbol::new("."));

pub static IMPORT: Lazy<Symbol> = Lazy::new(|| Symbol::new("#import"));
pub static IMPORT_MACROS: Lazy<Symbol> = Lazy::new(|| Symbol::new("#importMacros"));
pub static UNIMPORT_MACROS: Lazy<Symbol> = Lazy::new(|| Symbol::new("#unimportMacros"));
pub static NO_LEXICAL_MACROS: Lazy<Symbol> = Lazy::new(|| Symbol::new("#noLexicalMacros"));

/// Identifier substituted for the output of an input whose processing timed out.
pub static TIMED_OUT: Lazy<Symbol> = Lazy::new(|| Symbol::new("processing_thread_timed_out"));
