use crate::interpreter::ResponseType;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum DebuggerError {
    #[error("incomplete response to `{command}`: {text:?}")]
    IncompleteResponse { command: String, text: String },

    #[error("unexpected execution result for `{command}`: got {actual:?}, expected one of {expected:?}")]
    UnexpectedExecutionResult {
        command: String,
        actual: ResponseType,
        expected: Vec<ResponseType>,
        text: String,
    },

    #[error("interpreter failed while running `{command}`: {message}")]
    InterpreterRuntime {
        command: String,
        message: String,
        text: String,
    },

    #[error("interpreter channel failed after `{command}`")]
    ChannelIo {
        command: String,
        text: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid run configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DebuggerError {
    /// Channel failures mean the interpreter is gone; everything else leaves it usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DebuggerError::InterpreterRuntime { .. })
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            DebuggerError::IncompleteResponse { command, .. }
            | DebuggerError::UnexpectedExecutionResult { command, .. }
            | DebuggerError::InterpreterRuntime { command, .. }
            | DebuggerError::ChannelIo { command, .. } => Some(command),
            DebuggerError::Config(_) | DebuggerError::Io(_) => None,
        }
    }
}

pub type DebuggerResult<T> = Result<T, DebuggerError>;
