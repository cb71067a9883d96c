//! Text in, text out.
//!
//! The engine only rewrites trees; turning text into trees and back is the job
//! of a [`ParsingService`] and a [`NodePrinter`]. Each driver input may bring its
//! own pair. [`PrefixNotation`] is the reference implementation of both.

pub mod parser;
pub mod printer;

use crate::ast::Node;
use crate::diagnostics::{LexmacError, MessageSink};

pub use printer::print_forest;

/// Parses source text into a forest of nodes.
pub trait ParsingService: Send + Sync {
    /// Parses `text`. `file_name` is used for error reporting; recoverable
    /// problems may be written to `sink`.
    fn parse(&self, text: &str, file_name: &str, sink: &dyn MessageSink) -> Result<Vec<Node>, LexmacError>;
}

/// Renders a node as text.
pub trait NodePrinter: Send + Sync {
    fn print(&self, node: &Node) -> String;

    fn print_forest(&self, nodes: &[Node]) -> String {
        let mut out = String::new();
        for node in nodes {
            out.push_str(&self.print(node));
            out.push_str(";\n");
        }
        out
    }
}

/// The prefix-call notation described in `grammar.pest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixNotation;

impl ParsingService for PrefixNotation {
    fn parse(&self, text: &str, file_name: &str, _sink: &dyn MessageSink) -> Result<Vec<Node>, LexmacError> {
        parser::parse(text, file_name)
    }
}

impl NodePrinter for PrefixNotation {
    fn print(&self, node: &Node) -> String {
        node.to_string()
    }
}
