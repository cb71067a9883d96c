//! Defines the command-line arguments and subcommands for the Lexmac CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "lexmac",
    version,
    about = "Expands lexical macros in prefix-notation source files."
)]
pub struct LexmacArgs {
    /// Show more diagnostics (-v: debug, -vv: verbose, -vvv: everything).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Never color the output.
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Expand the built-in scope macros (#import, #importMacros, #unimportMacros, #noLexicalMacros) in files and print the result.
    ///
    /// Inputs are files or directories of `.lm` / `.lexmac` files. Macros beyond
    /// the built-ins are registered through the library API
    /// (`MacroProcessor::add_macros`); the command line cannot load them.
    Expand {
        /// Files or directories to expand.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Processor configuration file (.json, .yaml or .yml).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Expansion budget per input.
        #[arg(long)]
        max_expansions: Option<u32>,
        /// Per-input deadline in milliseconds; 0 disables it.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Expand all inputs concurrently.
        #[arg(long)]
        parallel: bool,
        /// Worker threads for --parallel (default: one per CPU).
        #[arg(long)]
        workers: Option<usize>,
        /// Open a namespace at the root scope of every input.
        #[arg(long = "open", value_name = "NAMESPACE")]
        open: Vec<String>,
        /// Show a diff between the input and the expanded output.
        #[arg(long)]
        diff: bool,
    },
    /// Parse files and print them back in normalized form.
    Parse {
        /// Files or directories to parse.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List the built-in macros.
    ListMacros,
}
