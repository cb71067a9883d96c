//! # Lexmac Test Helpers
//!
//! Small builders shared by the integration tests: a processor wired to an
//! in-memory message holder, and a handful of macros with known behavior.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lexmac::ast::Node;
use lexmac::diagnostics::{MessageHolder, Severity};
use lexmac::engine::{InputOutput, MacroProcessor, ProcessedInput, ProcessorConfig};
use lexmac::macros::{MacroEntry, MacroMode};
use lexmac::syntax::parser::parse;

/// Generous deadline so work runs on worker threads (with their large stacks)
/// without ever timing out.
pub const RELAXED_TIMEOUT_MS: u64 = 60_000;

pub fn config(max_expansions: u32) -> ProcessorConfig {
    ProcessorConfig {
        max_expansions,
        timeout_ms: Some(RELAXED_TIMEOUT_MS),
        ..ProcessorConfig::default()
    }
}

/// A processor with `entries` registered and the default budget.
pub fn processor(entries: impl IntoIterator<Item = MacroEntry>) -> (MacroProcessor, Arc<MessageHolder>) {
    processor_with(config(lexmac::macros::DEFAULT_MAX_EXPANSIONS), entries)
}

pub fn processor_with(
    config: ProcessorConfig,
    entries: impl IntoIterator<Item = MacroEntry>,
) -> (MacroProcessor, Arc<MessageHolder>) {
    let holder = Arc::new(MessageHolder::new());
    let mut processor = MacroProcessor::with_config(config, holder.clone());
    processor.add_macros(entries);
    (processor, holder)
}

pub fn forest(text: &str) -> Vec<Node> {
    parse(text, "test.lm").expect("test source parses")
}

pub fn one(text: &str) -> Node {
    let mut nodes = forest(text);
    assert_eq!(nodes.len(), 1, "expected exactly one node in {:?}", text);
    nodes.remove(0)
}

/// Runs one text input through the processor.
pub fn run(processor: &MacroProcessor, text: &str) -> ProcessedInput {
    let mut results = processor.process(vec![InputOutput::from_text("test.lm", text)]);
    results.remove(0)
}

/// Expands `text` and prints the result on one line, statements joined by `; `.
pub fn expand(processor: &MacroProcessor, text: &str) -> String {
    let result = run(processor, text);
    result
        .output
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn texts_at(holder: &MessageHolder, severity: Severity) -> Vec<String> {
    holder
        .messages()
        .into_iter()
        .filter(|m| m.severity == severity)
        .map(|m| m.text)
        .collect()
}

// ============================================================================
// MACROS
// ============================================================================

/// `name` (in any form) becomes `to`.
pub fn rewrite(name: &str, to: &str) -> MacroEntry {
    let to = to.to_string();
    MacroEntry::new(name, move |_, _| Ok(Some(Node::id(to.as_str()))))
}

/// Declines everything.
pub fn decliner(name: &str) -> MacroEntry {
    MacroEntry::new(name, |_, _| Ok(None))
}

/// `Pair(a, b)` becomes `#splice(a, b)`.
pub fn pair_splicer() -> MacroEntry {
    MacroEntry::new("Pair", |node, _| Ok(Some(Node::splice(node.args().iter().cloned()))))
}

/// `Loop(x)` becomes `Loop(w(x))`, so it never reaches a fixpoint. Counts
/// its expansions.
pub fn looping(counter: Arc<AtomicUsize>) -> MacroEntry {
    MacroEntry::new("Loop", move |node, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        let inner = node.args().iter().cloned();
        Ok(Some(Node::call_sym("Loop", [Node::call_sym("w", inner)])))
    })
}

/// `Count(..)` becomes `Count(n)`, where `n` is how many times it has run.
/// A runaway macro whose output stays the same size.
pub fn counting(counter: Arc<AtomicUsize>) -> MacroEntry {
    MacroEntry::new("Count", move |_, _| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(Node::call_sym("Count", [Node::number(n as f64)])))
    })
}
