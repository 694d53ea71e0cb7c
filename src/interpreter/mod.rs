mod classifier;
mod session;

pub use classifier::{classify, is_complete, ClassifiedResponse, IncompleteResponse};
pub(crate) use classifier::{is_current_line, is_trace_entry};
pub use session::{ProcessTerminator, RSession};

use crate::error::DebuggerResult;
use std::ops::Range;

pub const PLUS_AND_SPACE: &str = "+ ";
pub const BROWSE_PREFIX: &str = "Browse[";
pub const BROWSE_SUFFIX: &str = "]> ";
pub const DEBUGGING_IN: &str = "debugging in: ";
pub const DEBUG_AT_LINE_PREFIX: &str = "debug at #";
pub const DEBUG_AT_PREFIX: &str = "debug: ";
/// `Debug at N: ...`, the numbered form without `#`.
pub const DEBUG_AT_LABEL_PREFIX: &str = "Debug at ";
pub const EXITING_FROM: &str = "exiting from: ";
pub const TRACING_PREFIX: &str = "Tracing ";
pub const TRACE_ENTRY_SUFFIX: &str = " on entry";
pub const TRACE_EXIT_SUFFIX: &str = " on exit";
pub const LINE_SEPARATOR: char = '\n';

pub const EXECUTE_AND_STEP_COMMAND: &str = "n";
pub const BROWSER_COMMAND: &str = "browser()";
pub const LS_FUNCTIONS_COMMAND: &str = "Filter(function(x) is.function(get(x)), ls())";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Plus,
    Empty,
    DebuggingIn,
    DebugAt,
    ExitingFrom,
    RecursiveExitingFrom,
    ContinueTrace,
    StartTraceBrace,
    StartTraceUnbrace,
    Response,
}

/// One command's worth of interpreter output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Console text with the echo line and the terminal prompt removed.
    pub output: String,
    /// Everything read for this command, echo and prompt included.
    pub raw: String,
    pub kind: ResponseType,
    /// Byte range of program output inside `output`.
    pub output_range: Range<usize>,
    /// Whatever the interpreter wrote to its diagnostic stream.
    pub error: String,
}

impl ExecutionResult {
    pub fn new(response: ClassifiedResponse, error: impl Into<String>) -> Self {
        Self {
            output: response.text,
            raw: response.raw,
            kind: response.kind,
            output_range: response.output_range,
            error: error.into(),
        }
    }

    pub fn output_text(&self) -> &str {
        &self.output[self.output_range.clone()]
    }

    /// First diagnostic line reporting an evaluation failure.
    pub fn runtime_error(&self) -> Option<&str> {
        self.error
            .lines()
            .map(str::trim_start)
            .find(|line| line.starts_with("Error"))
    }
}

/// Blocking text channel to an interpreter sitting at a browser prompt.
pub trait Interpreter {
    fn execute(&mut self, command: &str) -> DebuggerResult<ExecutionResult>;
}

/// Ends the interpreter process from outside the thread talking to it, so a
/// pending read sees end of stream.
pub trait Terminator: Send + Sync {
    fn terminate(&self);
}

impl<T: Interpreter + ?Sized> Interpreter for Box<T> {
    fn execute(&mut self, command: &str) -> DebuggerResult<ExecutionResult> {
        (**self).execute(command)
    }
}

/// Extracts the package name from a "there is no package called" diagnostic.
pub fn failed_import(error: &str) -> Option<&str> {
    const MARKER: &str = "there is no package called ";
    let start = error.find(MARKER)? + MARKER.len();
    let rest = &error[start..];
    let rest = rest.trim_start_matches(|c| c == '‘' || c == '\'' || c == '"');
    let end = rest.find(|c| c == '’' || c == '\'' || c == '"')?;
    Some(&rest[..end])
}
