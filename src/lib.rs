pub use crate::diagnostics::{LexmacError, Message, MessageHolder, MessageSink, Severity};
pub use crate::engine::{InputOutput, MacroProcessor, ProcessStatus, ProcessedInput, ProcessorConfig};
pub use crate::macros::{MacroEntry, MacroMode, MacroPriority};

pub mod ast;
pub mod cli;
pub mod diagnostics;
pub mod discovery;
pub mod engine;
pub mod macros;
pub mod syntax;
