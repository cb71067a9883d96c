//! Printer for the prefix-call notation.
//!
//! `Display for Node` emits text that [`parse`](super::parser::parse) reads back
//! into an equal node. Blocks print as `{ a; b }` and two-part qualified names as
//! `A.B`; everything else prints as `target(args)`.

use std::fmt::{self, Write};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{symbol, Literal, Node, NodeKind, NodeStyle};

static PLAIN_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_#][A-Za-z0-9_#']*$").expect("valid identifier pattern"));

/// Prints a forest one statement per line.
pub fn print_forest<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> String {
    let mut out = String::new();
    for node in nodes {
        let _ = writeln!(out, "{};", node);
    }
    out
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_attrs() {
            f.write_str("@[")?;
            write_separated(f, self.attrs().iter(), ", ")?;
            f.write_str("] ")?;
        }
        write_bare(f, self)
    }
}

fn write_bare(f: &mut fmt::Formatter<'_>, node: &Node) -> fmt::Result {
    match node.kind() {
        NodeKind::Id(name) => write_ident(f, name.as_str()),
        NodeKind::Literal(lit) => write_literal(f, lit),
        NodeKind::Call { target, args } => {
            if node.calls(&symbol::BRACES) && node.style() == NodeStyle::Default {
                if args.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                write_separated(f, args.iter(), "; ")?;
                return f.write_str(" }");
            }
            if node.calls_n(&symbol::DOT, 2) && node.style() == NodeStyle::Default {
                let right = &args[1];
                if right.is_id() && !right.has_attrs() {
                    write_target(f, &args[0])?;
                    f.write_char('.')?;
                    return write_bare(f, right);
                }
            }
            write_target(f, target)?;
            if node.style() == NodeStyle::Macro {
                f.write_char('!')?;
            }
            f.write_char('(')?;
            write_separated(f, args.iter(), ", ")?;
            f.write_char(')')
        }
    }
}

/// Targets with attributes are parenthesized so the attributes stay on the target.
fn write_target(f: &mut fmt::Formatter<'_>, target: &Node) -> fmt::Result {
    if target.has_attrs() {
        write!(f, "({})", target)
    } else {
        write_bare(f, target)
    }
}

fn write_ident(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if PLAIN_IDENT.is_match(name) && name != "true" && name != "false" {
        f.write_str(name)
    } else {
        write!(f, "`{}`", name)
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, lit: &Literal) -> fmt::Result {
    match lit {
        Literal::Number(n) => write!(f, "{}", n),
        Literal::Bool(b) => write!(f, "{}", b),
        Literal::Str(s) => {
            f.write_char('"')?;
            for ch in s.chars() {
                match ch {
                    '"' => f.write_str("\\\"")?,
                    '\\' => f.write_str("\\\\")?,
                    '\n' => f.write_str("\\n")?,
                    '\t' => f.write_str("\\t")?,
                    '\r' => f.write_str("\\r")?,
                    other => f.write_char(other)?,
                }
            }
            f.write_char('"')
        }
    }
}

fn write_separated<'a>(
    f: &mut fmt::Formatter<'_>,
    nodes: impl Iterator<Item = &'a Node>,
    separator: &str,
) -> fmt::Result {
    for (i, node) in nodes.enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", node)?;
    }
    Ok(())
}
