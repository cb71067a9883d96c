//! The driver: runs macro expansion over a batch of inputs.
//!
//! A [`MacroProcessor`] owns the caller's macro table and configuration. Each
//! input is expanded by its own [`ExpansionTask`], which clones the table, so
//! inputs never see each other's registrations or imports.
//!
//! With a timeout configured, each task runs on a worker thread and the driver
//! waits on a channel until the deadline, counted from when the worker picked
//! the task up. A task that misses its deadline is told to stop and abandoned;
//! its output is replaced by the sentinel identifier
//! `processing_thread_timed_out` and an Error is reported. The remaining
//! inputs are unaffected.
//!
//! Concurrent batches run on a `rayon` pool of at most
//! [`ProcessorConfig::workers`] threads.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::ast::{symbol, Node, NodeList, Symbol};
use crate::diagnostics::{Cancelled, LexmacError, MessageSink, Severity, SharedSink};
use crate::macros::{ExpansionTask, MacroEntry, MacroTable, OpenSet, DEFAULT_MAX_EXPANSIONS};
use crate::syntax::{NodePrinter, ParsingService, PrefixNotation};

pub use crate::macros::CancellationToken;

// Deeply recursive expansions need more than the default 2 MiB.
const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How a batch of inputs is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    /// One input after another, in order.
    #[default]
    Sequential,
    /// Every input on its own worker at once.
    Concurrent,
}

/// Processor settings, loadable from JSON or YAML.
///
/// ```rust
/// use lexmac::engine::ProcessorConfig;
/// let config = ProcessorConfig::from_yaml_str("max_expansions: 100\ntimeout_ms: 0\n").unwrap();
/// assert_eq!(config.max_expansions, 100);
/// assert_eq!(config.timeout(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Expansion budget for each input.
    pub max_expansions: u32,
    /// Per-input deadline in milliseconds; `None` or `0` disables it.
    pub timeout_ms: Option<u64>,
    /// Namespaces open at the root scope of every input.
    pub pre_opened_namespaces: Vec<String>,
    pub mode: ProcessMode,
    /// Worker threads for concurrent batches; `None` means one per CPU.
    pub workers: Option<usize>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_expansions: DEFAULT_MAX_EXPANSIONS,
            timeout_ms: Some(30_000),
            pre_opened_namespaces: Vec::new(),
            mode: ProcessMode::Sequential,
            workers: None,
        }
    }
}

impl ProcessorConfig {
    /// Loads a config file, choosing the format by extension (`.json`,
    /// `.yaml` or `.yml`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LexmacError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| LexmacError::io(path.display(), e))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Err(LexmacError::config(format!(
                "unsupported config format for '{}' (expected .json, .yaml or .yml)",
                path.display()
            ))),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, LexmacError> {
        serde_json::from_str(text).map_err(|e| LexmacError::config(e.to_string()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, LexmacError> {
        serde_yaml::from_str(text).map_err(|e| LexmacError::config(e.to_string()))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.filter(|&ms| ms > 0).map(Duration::from_millis)
    }

    pub fn open_set(&self) -> OpenSet {
        self.pre_opened_namespaces
            .iter()
            .map(|ns| Symbol::new(ns))
            .collect()
    }
}

// ============================================================================
// INPUTS & RESULTS
// ============================================================================

/// What an input starts from.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Text for the input's parser.
    Text(String),
    /// An already-parsed forest.
    Nodes(Vec<Node>),
}

/// One unit of work for the processor.
#[derive(Clone)]
pub struct InputOutput {
    pub file_name: String,
    pub source: InputSource,
    /// Overrides the processor's parser for this input.
    pub parser: Option<Arc<dyn ParsingService>>,
    /// Overrides the processor's printer for this input.
    pub printer: Option<Arc<dyn NodePrinter>>,
    /// Free-form tag carried through to the result, e.g. an output path.
    pub output_tag: Option<String>,
}

impl InputOutput {
    pub fn from_text(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(file_name, InputSource::Text(text.into()))
    }

    pub fn from_nodes(file_name: impl Into<String>, nodes: impl IntoIterator<Item = Node>) -> Self {
        Self::new(file_name, InputSource::Nodes(nodes.into_iter().collect()))
    }

    fn new(file_name: impl Into<String>, source: InputSource) -> Self {
        Self {
            file_name: file_name.into(),
            source,
            parser: None,
            printer: None,
            output_tag: None,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ParsingService>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_printer(mut self, printer: Arc<dyn NodePrinter>) -> Self {
        self.printer = Some(printer);
        self
    }

    pub fn with_output_tag(mut self, tag: impl Into<String>) -> Self {
        self.output_tag = Some(tag.into());
        self
    }
}

impl std::fmt::Debug for InputOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputOutput")
            .field("file_name", &self.file_name)
            .field("source", &self.source)
            .field("output_tag", &self.output_tag)
            .finish()
    }
}

/// How processing of one input ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Completed,
    /// The deadline passed; the output is the timeout sentinel.
    TimedOut,
    /// A macro asked for processing to stop; the output is empty.
    Cancelled,
    /// The text could not be parsed; the output is empty.
    ParseFailed,
}

/// Result for one input.
#[derive(Clone)]
pub struct ProcessedInput {
    pub file_name: String,
    pub output_tag: Option<String>,
    /// The forest before expansion.
    pub input: NodeList,
    /// The forest after expansion.
    pub output: NodeList,
    pub status: ProcessStatus,
    printer: Arc<dyn NodePrinter>,
}

impl ProcessedInput {
    /// The output rendered by the input's printer.
    pub fn print(&self) -> String {
        let nodes: Vec<Node> = self.output.iter().cloned().collect();
        self.printer.print_forest(&nodes)
    }

    /// The unexpanded input rendered by the same printer.
    pub fn print_input(&self) -> String {
        let nodes: Vec<Node> = self.input.iter().cloned().collect();
        self.printer.print_forest(&nodes)
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProcessStatus::Completed
    }
}

impl std::fmt::Debug for ProcessedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedInput")
            .field("file_name", &self.file_name)
            .field("status", &self.status)
            .field("output", &self.output)
            .finish()
    }
}

/// The node that replaces the output of an input that timed out.
pub fn timeout_sentinel() -> Node {
    Node::id(&*symbol::TIMED_OUT)
}

// ============================================================================
// PROCESSOR
// ============================================================================

/// Holds the macro table and settings shared by every input.
pub struct MacroProcessor {
    macros: MacroTable,
    sink: SharedSink,
    config: ProcessorConfig,
    parser: Arc<dyn ParsingService>,
    printer: Arc<dyn NodePrinter>,
}

impl MacroProcessor {
    pub fn new(sink: SharedSink) -> Self {
        Self::with_config(ProcessorConfig::default(), sink)
    }

    pub fn with_config(config: ProcessorConfig, sink: SharedSink) -> Self {
        Self {
            macros: MacroTable::new(),
            sink,
            config,
            parser: Arc::new(PrefixNotation),
            printer: Arc::new(PrefixNotation),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ProcessorConfig {
        &mut self.config
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// Parser used for inputs that do not bring their own.
    pub fn set_default_parser(&mut self, parser: Arc<dyn ParsingService>) {
        self.parser = parser;
    }

    /// Printer used for inputs that do not bring their own.
    pub fn set_default_printer(&mut self, printer: Arc<dyn NodePrinter>) {
        self.printer = printer;
    }

    /// Registers one macro. Returns `false` if it was already registered.
    pub fn add_macro(&mut self, entry: MacroEntry) -> bool {
        self.macros.register(entry)
    }

    /// Registers a batch of macros. Returns whether any of them was new;
    /// an empty batch is reported as a Warning.
    pub fn add_macros(&mut self, entries: impl IntoIterator<Item = MacroEntry>) -> bool {
        let mut seen = 0;
        let mut added = false;
        for entry in entries {
            seen += 1;
            added |= self.macros.register(entry);
        }
        if seen == 0 {
            self.sink
                .write(Severity::Warning, &Node::id("add_macros"), "No macros found".to_string());
        }
        added
    }

    /// A task over this processor's macros, for callers that drive expansion
    /// themselves.
    pub fn new_task(&self) -> ExpansionTask<'_> {
        ExpansionTask::new(&self.macros, self.config.open_set(), &*self.sink)
            .with_max_expansions(self.config.max_expansions)
    }

    /// Expands a forest on the calling thread, without a deadline.
    pub fn process_nodes(&self, nodes: impl IntoIterator<Item = Node>) -> Result<NodeList, Cancelled> {
        self.new_task().process_forest(nodes.into_iter().collect())
    }

    /// Processes a batch in the configured mode. Results come back in input
    /// order.
    pub fn process(&self, inputs: Vec<InputOutput>) -> Vec<ProcessedInput> {
        self.process_with(inputs, |_| {})
    }

    /// Like [`process`](Self::process), calling `on_processed` for every input
    /// that did not time out, in input order.
    pub fn process_with(
        &self,
        inputs: Vec<InputOutput>,
        mut on_processed: impl FnMut(&ProcessedInput),
    ) -> Vec<ProcessedInput> {
        tracing::info!(
            inputs = inputs.len(),
            mode = ?self.config.mode,
            max_expansions = self.config.max_expansions,
            "processing batch"
        );
        let results: Vec<ProcessedInput> = match self.config.mode {
            ProcessMode::Sequential => self.process_sequentially(inputs, &mut on_processed),
            ProcessMode::Concurrent => match self.worker_pool() {
                Ok(pool) => self.process_concurrently(&pool, inputs, &mut on_processed),
                Err(err) => {
                    tracing::warn!(error = %err, "worker pool unavailable, processing sequentially");
                    self.process_sequentially(inputs, &mut on_processed)
                }
            },
        };
        tracing::info!(
            completed = results.iter().filter(|r| r.is_completed()).count(),
            "batch finished"
        );
        results
    }

    fn process_sequentially(
        &self,
        inputs: Vec<InputOutput>,
        on_processed: &mut impl FnMut(&ProcessedInput),
    ) -> Vec<ProcessedInput> {
        inputs
            .into_iter()
            .map(|io| {
                let result = self.process_one(io);
                if result.status != ProcessStatus::TimedOut {
                    on_processed(&result);
                }
                result
            })
            .collect()
    }

    fn process_concurrently(
        &self,
        pool: &ThreadPool,
        inputs: Vec<InputOutput>,
        on_processed: &mut impl FnMut(&ProcessedInput),
    ) -> Vec<ProcessedInput> {
        let queued: Vec<Pending> = inputs
            .into_iter()
            .map(|io| {
                let (pending, work) = self.prepare(io);
                pool.spawn(work);
                pending
            })
            .collect();
        // Dropping the pool later does not wait for abandoned workers.
        queued
            .into_iter()
            .map(|pending| {
                let result = self.finish(pending);
                if result.status != ProcessStatus::TimedOut {
                    on_processed(&result);
                }
                result
            })
            .collect()
    }

    fn worker_pool(&self) -> Result<ThreadPool, ThreadPoolBuildError> {
        ThreadPoolBuilder::new()
            .num_threads(self.config.workers.unwrap_or(0))
            .stack_size(WORKER_STACK_SIZE)
            .thread_name(|i| format!("lexmac-worker-{}", i))
            .build()
    }

    fn process_one(&self, io: InputOutput) -> ProcessedInput {
        if self.config.timeout().is_none() {
            let printer = self.printer_for(&io);
            let (file_name, output_tag) = (io.file_name.clone(), io.output_tag.clone());
            let outcome = run_job(self.job(CancellationToken::new()), io);
            return outcome.into_result(file_name, output_tag, printer);
        }
        let (pending, work) = self.prepare(io);
        let spawned = thread::Builder::new()
            .name(format!("lexmac:{}", pending.file_name))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(work);
        if let Err(err) = spawned {
            tracing::error!(file = %pending.file_name, error = %err, "failed to spawn worker");
            self.sink.write(
                Severity::Error,
                &Node::id(pending.file_name.as_str()),
                format!("Failed to start processing thread: {}", err),
            );
        }
        self.finish(pending)
    }

    fn job(&self, token: CancellationToken) -> Job {
        Job {
            macros: self.macros.clone(),
            pre_opened: self.config.open_set(),
            sink: Arc::clone(&self.sink),
            parser: Arc::clone(&self.parser),
            max_expansions: self.config.max_expansions,
            token,
        }
    }

    fn printer_for(&self, io: &InputOutput) -> Arc<dyn NodePrinter> {
        io.printer.clone().unwrap_or_else(|| Arc::clone(&self.printer))
    }

    /// Packages one input as work for a worker thread. The worker reports
    /// when it starts, so the deadline does not include time spent queued.
    fn prepare(&self, io: InputOutput) -> (Pending, impl FnOnce() + Send + 'static) {
        let token = CancellationToken::new();
        let timeout = self.config.timeout();
        let (started_tx, started) = crossbeam_channel::bounded(1);
        let (done_tx, done) = crossbeam_channel::bounded(1);
        let pending = Pending {
            file_name: io.file_name.clone(),
            output_tag: io.output_tag.clone(),
            printer: self.printer_for(&io),
            token: token.clone(),
            started,
            done,
        };
        let mut job = self.job(token);
        let work = move || {
            let at = Instant::now();
            if let Some(timeout) = timeout {
                job.token = job.token.expiring_at(at + timeout);
            }
            // The driver may have stopped listening.
            let _ = started_tx.send(at);
            let _ = done_tx.send(run_job(job, io));
        };
        (pending, work)
    }

    /// Waits for a worker, giving up at its deadline.
    fn finish(&self, pending: Pending) -> ProcessedInput {
        let Pending {
            file_name,
            output_tag,
            printer,
            token,
            started,
            done,
        } = pending;
        let received = match started.recv() {
            Ok(at) => match self.config.timeout() {
                Some(timeout) => done.recv_deadline(at + timeout),
                None => done.recv().map_err(|_| RecvTimeoutError::Disconnected),
            },
            Err(_) => Err(RecvTimeoutError::Disconnected),
        };
        let outcome = match received {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => JobOutcome::timed_out(),
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!(file = %file_name, "worker exited without a result");
                self.sink.write(
                    Severity::Error,
                    &Node::id(file_name.as_str()),
                    "Processing thread stopped without producing output".to_string(),
                );
                JobOutcome {
                    input: NodeList::new(),
                    output: NodeList::new(),
                    status: ProcessStatus::Cancelled,
                }
            }
        };
        if outcome.status == ProcessStatus::TimedOut {
            token.cancel();
            let ms = self.config.timeout().map_or(0, |t| t.as_millis());
            tracing::warn!(file = %file_name, timeout_ms = %ms, "processing timed out");
            self.sink.write(
                Severity::Error,
                &timeout_sentinel(),
                format!("Processing of '{}' timed out after {} ms", file_name, ms),
            );
        }
        outcome.into_result(file_name, output_tag, printer)
    }
}

// ============================================================================
// WORKERS
// ============================================================================

/// Everything a worker needs, owned so the worker can outlive the driver's
/// interest in it.
struct Job {
    macros: MacroTable,
    pre_opened: OpenSet,
    sink: SharedSink,
    parser: Arc<dyn ParsingService>,
    max_expansions: u32,
    token: CancellationToken,
}

struct JobOutcome {
    input: NodeList,
    output: NodeList,
    status: ProcessStatus,
}

impl JobOutcome {
    fn timed_out() -> Self {
        Self {
            input: NodeList::new(),
            output: NodeList::unit(timeout_sentinel()),
            status: ProcessStatus::TimedOut,
        }
    }

    fn into_result(self, file_name: String, output_tag: Option<String>, printer: Arc<dyn NodePrinter>) -> ProcessedInput {
        ProcessedInput {
            file_name,
            output_tag,
            input: self.input,
            output: self.output,
            status: self.status,
            printer,
        }
    }
}

/// The driver's side of a queued input.
struct Pending {
    file_name: String,
    output_tag: Option<String>,
    printer: Arc<dyn NodePrinter>,
    token: CancellationToken,
    started: Receiver<Instant>,
    done: Receiver<JobOutcome>,
}

fn run_job(job: Job, io: InputOutput) -> JobOutcome {
    let started = Instant::now();
    tracing::debug!(file = %io.file_name, "expanding input");

    let nodes: NodeList = match io.source {
        InputSource::Nodes(nodes) => nodes.into_iter().collect(),
        InputSource::Text(text) => {
            let parser = io.parser.unwrap_or(job.parser);
            match parser.parse(&text, &io.file_name, &*job.sink) {
                Ok(nodes) => nodes.into_iter().collect(),
                Err(err) => {
                    job.sink
                        .write(Severity::Error, &Node::id(io.file_name.as_str()), err.to_string());
                    return JobOutcome {
                        input: NodeList::new(),
                        output: NodeList::new(),
                        status: ProcessStatus::ParseFailed,
                    };
                }
            }
        }
    };

    let mut task = ExpansionTask::new(&job.macros, job.pre_opened, &*job.sink)
        .with_cancellation(job.token.clone())
        .with_max_expansions(job.max_expansions);
    let outcome = match task.process_forest(nodes.clone()) {
        Ok(output) => JobOutcome {
            input: nodes,
            output,
            status: ProcessStatus::Completed,
        },
        Err(Cancelled) if job.token.is_cancelled() => JobOutcome {
            input: nodes,
            ..JobOutcome::timed_out()
        },
        Err(Cancelled) => JobOutcome {
            input: nodes,
            output: NodeList::new(),
            status: ProcessStatus::Cancelled,
        },
    };
    tracing::debug!(
        file = %io.file_name,
        status = ?outcome.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "input done"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MessageHolder;

    #[test]
    fn config_defaults_and_zero_timeout() {
        let config = ProcessorConfig::default();
        assert_eq!(config.max_expansions, 0xFFFF);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        let config = ProcessorConfig::from_json_str(r#"{"timeout_ms": 0, "mode": "concurrent"}"#).unwrap();
        assert_eq!(config.timeout(), None);
        assert_eq!(config.mode, ProcessMode::Concurrent);
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let err = ProcessorConfig::from_json_str(r#"{"budget": 3}"#).unwrap_err();
        assert!(matches!(err, LexmacError::Config { .. }));
    }

    #[test]
    fn empty_batch_of_macros_warns() {
        let holder = Arc::new(MessageHolder::new());
        let mut processor = MacroProcessor::new(holder.clone());
        assert!(!processor.add_macros(Vec::new()));
        assert_eq!(holder.count(Severity::Warning), 1);
        assert_eq!(holder.messages()[0].text, "No macros found");
    }

    #[test]
    fn parse_failure_is_reported_and_yields_empty_output() {
        let holder = Arc::new(MessageHolder::new());
        let processor = MacroProcessor::new(holder.clone());
        let results = processor.process(vec![InputOutput::from_text("bad.lm", "f(")]);
        assert_eq!(results[0].status, ProcessStatus::ParseFailed);
        assert!(results[0].output.is_empty());
        assert_eq!(holder.count(Severity::Error), 1);
    }
}
