mod breakpoints;
mod context;
mod evaluator;
mod factory;
mod function;
mod output;
mod script;
mod stepping;
mod var_handler;

pub use breakpoints::{Breakpoints, Hit};
pub use context::{DebugContext, FrameEvents};
pub use evaluator::{evaluation_command, Variable, LS_COMMAND};
pub use factory::{find_entry, FunctionDebuggerFactory, RFunctionDebuggerFactory, TraceEntry};
pub use function::{BodyShape, FunctionDebugger};
pub use output::{BufferedOutput, ConsoleOutput, OutputRecord, OutputSink};
pub use script::{ScriptDebugger, ScriptLine, ScriptReader};
pub use stepping::RunMode;
pub use var_handler::{
    function_names, instrumentation_commands, VarHandler, SERVICE_ENTER_FUNCTION_SUFFIX,
    SERVICE_EXIT_FUNCTION_SUFFIX, SERVICE_FUNCTION_PREFIX,
};

use crate::error::{DebuggerError, DebuggerResult};
use crate::interpreter::{failed_import, ExecutionResult, Interpreter, ResponseType};
use std::fmt;
use tracing::warn;

/// Frame name used for top-level script statements.
pub const MAIN_FUNCTION_NAME: &str = "<main>";

/// Line reported by a frame that has nothing left to run.
pub const NO_LINE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub function_name: String,
    /// 1-based, as the interpreter prints it; `NO_LINE` once finished.
    pub line: i32,
}

impl Location {
    pub fn new(function_name: impl Into<String>, line: i32) -> Self {
        Self {
            function_name: function_name.into(),
            line,
        }
    }

    pub fn main(line: i32) -> Self {
        Self::new(MAIN_FUNCTION_NAME, line)
    }

    pub fn is_main(&self) -> bool {
        self.function_name == MAIN_FUNCTION_NAME
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.function_name, self.line)
    }
}

/// Callbacks a frame uses to reshape the frame stack it lives in.
pub trait FrameHandler {
    fn append_debugger(&mut self, debugger: Box<dyn FrameDebugger>);
    /// Frames to discard below the one that just finished.
    fn set_drop_frames(&mut self, count: usize);
    /// Line the caller resumed at, when the interpreter reported it.
    fn set_return_line_number(&mut self, line: i32);
}

pub trait FrameDebugger: Send {
    fn advance(&mut self, ctx: &mut StepContext<'_>) -> DebuggerResult<()>;

    fn has_next(&self) -> bool;

    fn location(&self) -> &Location;

    /// Captured output of a finished frame; yields it once.
    fn take_result(&mut self) -> Option<String>;

    fn set_return_line(&mut self, _line: i32) {}

    /// The frame above this one returned.
    fn resume_after_call(&mut self) {}
}

/// Everything a frame touches while it steps.
pub struct StepContext<'a> {
    pub interpreter: &'a mut dyn Interpreter,
    pub factory: &'a dyn FunctionDebuggerFactory,
    pub sink: &'a mut dyn OutputSink,
    pub handler: &'a mut dyn FrameHandler,
}

impl StepContext<'_> {
    /// Runs one command, forwarding its diagnostic text to the sink.
    pub fn execute(&mut self, command: &str) -> DebuggerResult<ExecutionResult> {
        let result = self.interpreter.execute(command)?;

        if !result.error.is_empty() {
            if let Some(package) = failed_import(&result.error) {
                warn!(package, "package could not be loaded");
            }
            self.sink.error(&result.error);
        }

        if let Some(message) = result.runtime_error() {
            return Err(DebuggerError::InterpreterRuntime {
                command: command.to_string(),
                message: message.to_string(),
                text: result.raw.clone(),
            });
        }

        Ok(result)
    }

    pub fn execute_expecting(
        &mut self,
        command: &str,
        expected: &[ResponseType],
    ) -> DebuggerResult<ExecutionResult> {
        let result = self.execute(command)?;
        if expected.contains(&result.kind) {
            Ok(result)
        } else {
            Err(unexpected(command, &result, expected))
        }
    }

    pub fn emit(&mut self, text: &str) {
        if !text.is_empty() {
            self.sink.output(text);
        }
    }
}

pub(crate) fn unexpected(
    command: &str,
    result: &ExecutionResult,
    expected: &[ResponseType],
) -> DebuggerError {
    DebuggerError::UnexpectedExecutionResult {
        command: command.to_string(),
        actual: result.kind,
        expected: expected.to_vec(),
        text: result.raw.clone(),
    }
}
