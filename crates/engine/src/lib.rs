//! Command engine
//!
//! Turns a line of user text into tool calls: translate, parse, execute,
//! and for thought sequences decide whether to keep going.

pub mod classify;
pub mod driver;
pub mod executor;
pub mod parser;
pub mod translator;
pub mod value;

pub use classify::{ErrorClassifier, ErrorInfo, ErrorKind};
pub use driver::{
    DriverSettings, DriverState, SequenceDriver, SequenceReport, SequenceState, StepPosition,
    Termination, ThoughtTool,
};
pub use executor::{
    ContentItem, Executor, RawContent, RawResult, RemoteError, StepOutcome, ToolEndpoint,
    ToolInfo, ERROR_MARKER,
};
pub use parser::{parse, parse_argv, parse_reporting, CommandStyle, ParseError, Parsed};
pub use translator::{
    ChatCompletion, Completion, CompletionError, Sentinels, Translation, TranslationContext,
    TranslationResult, Translator,
};
pub use value::{Arguments, Command, Value};
