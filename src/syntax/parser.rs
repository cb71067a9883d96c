//! Lexmac Parser - Prefix-Call Notation
//!
//! Converts source text into [`Node`]s. The parser is purely syntactic: it knows
//! nothing about macros, and the only structure it recognizes is calls, blocks,
//! qualified names and attributes. See `grammar.pest` for the notation.

use miette::{NamedSource, SourceSpan};
use pest::{error::Error, iterators::Pair, Parser};
use pest_derive::Parser;

use crate::ast::{Node, NodeList, NodeStyle};
use crate::diagnostics::LexmacError;

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct PrefixParser;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parse source text into a forest of top-level nodes.
///
/// ```rust
/// use lexmac::syntax::parser::parse;
/// let nodes = parse("f(x); { g(1) }", "demo").unwrap();
/// assert_eq!(nodes.len(), 2);
/// ```
pub fn parse(source_text: &str, file_name: &str) -> Result<Vec<Node>, LexmacError> {
    let source = SourceText {
        name: file_name,
        text: source_text,
    };
    let mut pairs = PrefixParser::parse(Rule::program, source_text)
        .map_err(|e| convert_parse_error(e, &source))?;

    let Some(program) = pairs.next() else {
        return Ok(Vec::new());
    };

    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(|p| build_node(p, &source))
        .collect()
}

// ============================================================================
// NODE BUILDERS
// ============================================================================

struct SourceText<'a> {
    name: &'a str,
    text: &'a str,
}

fn build_node(pair: Pair<Rule>, source: &SourceText) -> Result<Node, LexmacError> {
    let span = pair.as_span();

    match pair.as_rule() {
        Rule::expr => build_expr(pair, source),

        Rule::number => {
            let text = pair.as_str();
            let value = text
                .parse::<f64>()
                .map_err(|_| make_error(source, format!("invalid number '{}'", text), span.start(), span.end()))?;
            Ok(Node::number(value))
        }

        Rule::boolean => Ok(Node::boolean(pair.as_str() == "true")),

        Rule::string => Ok(Node::string(unescape_string(pair.as_str()))),

        Rule::ident => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| make_error(source, "empty identifier", span.start(), span.end()))?;
            Ok(Node::id(ident_text(&inner)))
        }

        Rule::block => {
            let stmts = pair
                .into_inner()
                .map(|p| build_node(p, source))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Node::braces(stmts))
        }

        rule => Err(make_error(
            source,
            format!("unsupported rule: {:?}", rule),
            span.start(),
            span.end(),
        )),
    }
}

/// `attrs? primary postfix*`: fold postfix calls and members onto the primary,
/// then attach attributes to the result.
fn build_expr(pair: Pair<Rule>, source: &SourceText) -> Result<Node, LexmacError> {
    let span = pair.as_span();
    let mut attrs = NodeList::new();
    let mut node: Option<Node> = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::attrs => {
                for attr in part.into_inner() {
                    attrs.push_back(build_node(attr, source)?);
                }
            }
            Rule::call => {
                let target = node
                    .take()
                    .ok_or_else(|| make_error(source, "call without a target", span.start(), span.end()))?;
                let mut style = NodeStyle::Default;
                let mut args = NodeList::new();
                for arg in part.into_inner() {
                    if arg.as_rule() == Rule::bang {
                        style = NodeStyle::Macro;
                    } else {
                        args.push_back(build_node(arg, source)?);
                    }
                }
                node = Some(Node::call(target, args).with_style(style));
            }
            Rule::member => {
                let left = node
                    .take()
                    .ok_or_else(|| make_error(source, "member without a target", span.start(), span.end()))?;
                let member_span = part.as_span();
                let right = part
                    .into_inner()
                    .next()
                    .ok_or_else(|| make_error(source, "expected identifier after '.'", member_span.start(), member_span.end()))?;
                node = Some(Node::dotted(left, build_node(right, source)?));
            }
            _ => node = Some(build_node(part, source)?),
        }
    }

    let node = node.ok_or_else(|| make_error(source, "empty expression", span.start(), span.end()))?;
    if attrs.is_empty() {
        return Ok(node);
    }
    attrs.append(node.attrs().clone());
    Ok(node.with_attrs(attrs))
}

// ============================================================================
// UTILITIES
// ============================================================================

fn ident_text(pair: &Pair<Rule>) -> String {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::quoted_ident => text[1..text.len() - 1].to_string(),
        _ => text.to_string(),
    }
}

fn unescape_string(text: &str) -> String {
    // Remove surrounding quotes
    let inner = &text[1..text.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }

    result
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

fn make_error(source: &SourceText, message: impl Into<String>, start: usize, end: usize) -> LexmacError {
    LexmacError::Parse {
        message: message.into(),
        src: NamedSource::new(source.name, source.text.to_string()),
        span: SourceSpan::new(start.into(), end.saturating_sub(start)),
    }
}

fn convert_parse_error(error: Error<Rule>, source: &SourceText) -> LexmacError {
    let (start, end) = match error.location {
        pest::error::InputLocation::Pos(pos) => (pos, pos),
        pest::error::InputLocation::Span((start, end)) => (start, end),
    };

    // Simple error message improvement
    let text = source.text;
    let message = if text.matches('(').count() > text.matches(')').count() {
        "Missing closing parenthesis"
    } else if text.matches('{').count() > text.matches('}').count() {
        "Missing closing brace"
    } else if text.matches('"').count() % 2 == 1 {
        "Missing closing quote"
    } else {
        "Syntax error"
    };

    make_error(source, message, start, end)
}
