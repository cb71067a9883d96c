//! The Lexmac Command-Line Interface.
//!
//! This module is the main entry point for all CLI commands and orchestrates
//! the core library functions.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::args::{Command, LexmacArgs};
use crate::cli::output::ConsoleSink;
use crate::diagnostics::{LexmacError, NullSink, Severity};
use crate::discovery;
use crate::engine::{MacroProcessor, ProcessMode, ProcessStatus, ProcessorConfig};
use crate::macros::builtin_macros;
use crate::syntax::{print_forest, ParsingService, PrefixNotation};

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = LexmacArgs::parse();
    init_tracing(args.verbose);
    let color = if args.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    // Dispatch to the appropriate subcommand handler.
    let result = match args.command {
        Command::Expand {
            paths,
            config,
            max_expansions,
            timeout_ms,
            parallel,
            workers,
            open,
            diff,
        } => {
            let options = ExpandOptions {
                config,
                max_expansions,
                timeout_ms,
                parallel,
                workers,
                open,
                diff,
            };
            handle_expand(&paths, options, sink_severity(args.verbose), color)
        }
        Command::Parse { paths } => handle_parse(&paths, color),
        Command::ListMacros => {
            let mut stdout = StandardStream::stdout(color);
            output::print_macro_list(&mut stdout, builtin_macros());
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "lexmac=warn",
        1 => "lexmac=info",
        2 => "lexmac=debug",
        _ => "lexmac=trace",
    };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn sink_severity(verbose: u8) -> Severity {
    match verbose {
        0 => Severity::Warning,
        1 => Severity::Debug,
        2 => Severity::Verbose,
        _ => Severity::Detail,
    }
}

struct ExpandOptions {
    config: Option<PathBuf>,
    max_expansions: Option<u32>,
    timeout_ms: Option<u64>,
    parallel: bool,
    workers: Option<usize>,
    open: Vec<String>,
    diff: bool,
}

/// Handles the `expand` subcommand. Returns `false` if any input failed or
/// any Error diagnostic was reported.
fn handle_expand(
    paths: &[PathBuf],
    options: ExpandOptions,
    min_severity: Severity,
    color: ColorChoice,
) -> Result<bool, LexmacError> {
    let mut config = match &options.config {
        Some(path) => ProcessorConfig::from_file(path)?,
        None => ProcessorConfig::default(),
    };
    if let Some(n) = options.max_expansions {
        config.max_expansions = n;
    }
    if let Some(ms) = options.timeout_ms {
        config.timeout_ms = Some(ms);
    }
    if options.parallel {
        config.mode = ProcessMode::Concurrent;
    }
    if options.workers.is_some() {
        config.workers = options.workers;
    }
    config.pre_opened_namespaces.extend(options.open);

    let files = discovery::discover_sources(paths)?;
    let inputs = discovery::load_inputs(&files)?;

    let sink = Arc::new(ConsoleSink::new(min_severity, color));
    let processor = MacroProcessor::with_config(config, sink.clone());

    let mut stdout = StandardStream::stdout(color);
    let show_headers = files.len() > 1;
    let results = processor.process(inputs);
    for result in &results {
        if show_headers {
            output::print_header(&mut stdout, &result.file_name);
        }
        if options.diff {
            output::print_changes(&mut stdout, &result.print_input(), &result.print());
        } else {
            output::print_text(&mut stdout, &result.print());
        }
    }

    let all_completed = results.iter().all(|r| r.status == ProcessStatus::Completed);
    Ok(all_completed && sink.error_count() == 0)
}

/// Handles the `parse` subcommand.
fn handle_parse(paths: &[PathBuf], color: ColorChoice) -> Result<bool, LexmacError> {
    let files = discovery::discover_sources(paths)?;
    let mut stdout = StandardStream::stdout(color);
    let show_headers = files.len() > 1;
    for file in &files {
        let nodes = parse_file(file)?;
        if show_headers {
            output::print_header(&mut stdout, &file.display().to_string());
        }
        output::print_text(&mut stdout, &print_forest(&nodes));
    }
    Ok(true)
}

fn parse_file(path: &Path) -> Result<Vec<crate::ast::Node>, LexmacError> {
    let text = std::fs::read_to_string(path).map_err(|e| LexmacError::io(path.display(), e))?;
    PrefixNotation.parse(&text, &path.display().to_string(), &NullSink)
}
