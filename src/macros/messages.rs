//! Reporting of what happened when a group of macros saw one node.
//!
//! Every macro invocation writes into a shared per-dispatch [`MessageHolder`];
//! each [`Attempt`] remembers the range it wrote. Once the whole tier has run,
//! [`report`] decides what reaches the real sink:
//!
//! - several accepting macros produce an ambiguity Warning (equal outputs) or
//!   Error (different outputs), unless duplicates are explicitly allowed
//! - a macro-style call (`name!(...)`) that nobody accepted lists the macros
//!   that declined it
//! - a macro's own messages are forwarded, prefixed by its label, when it
//!   accepted, when they are severe enough, or when the call was macro style

use std::ops::Range;

use crate::ast::{Node, NodeStyle};
use crate::diagnostics::{MessageHolder, MessageSink, Severity};
use crate::macros::types::MacroEntry;

/// One macro invocation within a dispatch.
#[derive(Debug)]
pub(crate) struct Attempt {
    pub entry: MacroEntry,
    pub output: Option<Node>,
    pub messages: Range<usize>,
}

/// Forwards the interesting parts of a dispatch to `sink`.
pub(crate) fn report(
    sink: &dyn MessageSink,
    holder: &MessageHolder,
    attempts: &[Attempt],
    input: &Node,
    accepted: usize,
    max_severity: Option<Severity>,
) {
    if accepted > 1 {
        report_ambiguity(sink, attempts, input, accepted);
    }

    let macro_style = input.style() == NodeStyle::Macro;
    let mut severity = max_severity.unwrap_or(Severity::Detail);
    if accepted == 0 && !macro_style && severity < Severity::Warning {
        return;
    }
    if macro_style && severity < Severity::Warning {
        severity = Severity::Warning;
    }

    if accepted == 0 && macro_style && sink.is_enabled(severity) {
        let rejected = labels_where(attempts, |a| a.output.is_none() && !a.entry.mode.passive);
        if !rejected.is_empty() {
            sink.write(
                severity,
                input,
                format!(
                    "{} macro(s) saw the input and declined to process it: {}",
                    attempts.len(),
                    rejected.join(", ")
                ),
            );
        }
    }

    for attempt in attempts {
        let label = attempt.entry.label();
        // Details trail the message they elaborate on.
        let mut printed_last = true;
        for msg in holder.slice(attempt.messages.clone()) {
            let wanted = attempt.output.is_some()
                || macro_style
                || msg.severity >= Severity::Warning
                || (msg.severity == Severity::Detail && printed_last);
            printed_last = wanted && sink.is_enabled(msg.severity);
            if printed_last {
                sink.write(msg.severity, &msg.context, format!("{}: {}", label, msg.text));
            }
        }
    }
}

fn report_ambiguity(sink: &dyn MessageSink, attempts: &[Attempt], input: &Node, accepted: usize) {
    let winners: Vec<&Attempt> = attempts.iter().filter(|a| a.output.is_some()).collect();
    let first = winners.first().and_then(|a| a.output.as_ref());
    let equal = winners.iter().all(|a| a.output.as_ref() == first);
    let allowed = winners.iter().any(|a| a.entry.mode.allow_duplicates);
    if equal && allowed {
        return;
    }

    let labels = labels_where(attempts, |a| a.output.is_some()).join(", ");
    if equal {
        sink.write(
            Severity::Warning,
            input,
            format!(
                "Ambiguous macro call. {} macros accepted the input and produced identical results: {}",
                accepted, labels
            ),
        );
    } else {
        sink.write(
            Severity::Error,
            input,
            format!("Ambiguous macro call. {} macros accepted the input: {}", accepted, labels),
        );
    }
}

/// Labels of the attempts that pass `keep`. Labels that would read the same
/// are suffixed with their candidate position (`Foo#1`, `Foo#2`).
fn labels_where(attempts: &[Attempt], keep: impl Fn(&Attempt) -> bool) -> Vec<String> {
    let labels: Vec<String> = attempts.iter().map(|a| a.entry.label()).collect();
    attempts
        .iter()
        .enumerate()
        .filter(|(_, a)| keep(a))
        .map(|(i, _)| {
            let label = &labels[i];
            if labels.iter().filter(|other| *other == label).count() > 1 {
                format!("{}#{}", label, i + 1)
            } else {
                label.clone()
            }
        })
        .collect()
}
