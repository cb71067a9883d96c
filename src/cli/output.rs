//! Handles all user-facing output for the CLI.
//!
//! Expanded source goes to stdout; diagnostics go to stderr, colored by
//! severity.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use difference::{Changeset, Difference};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::ast::Node;
use crate::diagnostics::{MessageSink, Severity};
use crate::macros::MacroEntry;

// ============================================================================
// DIAGNOSTICS SINK
// ============================================================================

/// Writes diagnostics to stderr and counts the errors.
#[derive(Debug)]
pub struct ConsoleSink {
    min_severity: Severity,
    color: ColorChoice,
    errors: AtomicUsize,
}

impl ConsoleSink {
    pub fn new(min_severity: Severity, color: ColorChoice) -> Self {
        Self {
            min_severity,
            color,
            errors: AtomicUsize::new(0),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

impl MessageSink for ConsoleSink {
    fn write(&self, severity: Severity, context: &Node, text: String) {
        if severity == Severity::Error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        if !self.is_enabled(severity) {
            return;
        }
        let stderr = StandardStream::stderr(self.color);
        let mut lock = stderr.lock();
        let _ = lock.set_color(ColorSpec::new().set_fg(Some(severity_color(severity))).set_bold(true));
        let _ = write!(lock, "{}", severity);
        let _ = lock.reset();
        let _ = writeln!(lock, ": {}", text);
        let _ = lock.set_color(ColorSpec::new().set_dimmed(true));
        let _ = writeln!(lock, "  at {}", context);
        let _ = lock.reset();
    }

    fn is_enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Error => Color::Red,
        Severity::Warning => Color::Yellow,
        Severity::Debug => Color::Cyan,
        Severity::Verbose | Severity::Detail => Color::White,
    }
}

// ============================================================================
// CORE OUTPUT FUNCTIONS: User-facing CLI output utilities
// ============================================================================

/// Prints a `// file` header line before a file's output.
pub fn print_header(stdout: &mut StandardStream, file_name: &str) {
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
    let _ = writeln!(stdout, "// {}", file_name);
    let _ = stdout.reset();
}

pub fn print_text(stdout: &mut StandardStream, text: &str) {
    let _ = write!(stdout, "{}", text);
}

/// Prints a line diff between the unexpanded and expanded text.
pub fn print_changes(stdout: &mut StandardStream, before: &str, after: &str) {
    let changeset = Changeset::new(before.trim_end(), after.trim_end(), "\n");
    print_diff(stdout, &changeset.diffs);
}

/// Prints one line per macro: name, namespace, mode.
pub fn print_macro_list(stdout: &mut StandardStream, entries: &[MacroEntry]) {
    for entry in entries {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
        let _ = write!(stdout, "{:<18}", entry.name.as_str());
        let _ = stdout.reset();
        let namespace = entry.namespace.as_ref().map_or("(global)", |ns| ns.as_str());
        let mode = &entry.mode;
        let mut flags = vec![format!("{:?}", mode.reprocess).to_lowercase()];
        if mode.children_before {
            flags.push("children-before".into());
        }
        if mode.passive {
            flags.push("passive".into());
        }
        if mode.allow_duplicates {
            flags.push("allow-duplicates".into());
        }
        let _ = writeln!(
            stdout,
            " {:<10} {:?} [{}] {}",
            namespace,
            mode.priority,
            flags.join(", "),
            entry.label()
        );
    }
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn print_diff(stdout: &mut StandardStream, diffs: &[Difference]) {
    for diff in diffs {
        let (prefix, color, text) = match diff {
            Difference::Same(ref x) => (' ', None, x),
            Difference::Add(ref x) => ('+', Some(Color::Green), x),
            Difference::Rem(ref x) => ('-', Some(Color::Red), x),
        };
        let _ = stdout.set_color(ColorSpec::new().set_fg(color));
        for line in text.lines() {
            let _ = writeln!(stdout, "{}{}", prefix, line);
        }
    }
    let _ = stdout.reset();
}
