use super::{unexpected, FrameDebugger, Location, StepContext, VarHandler, NO_LINE};
use crate::error::DebuggerResult;
use crate::interpreter::ResponseType;
use std::fs;
use std::io;
use std::path::Path;

const STATEMENT_RESPONSES: [ResponseType; 4] = [
    ResponseType::Empty,
    ResponseType::Response,
    ResponseType::Plus,
    ResponseType::DebuggingIn,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub text: Option<String>,
    /// 1-based; `NO_LINE` for the sentinel.
    pub number: i32,
}

impl ScriptLine {
    pub fn nop() -> Self {
        Self {
            text: None,
            number: NO_LINE,
        }
    }

    pub fn is_nop(&self) -> bool {
        self.text.is_none()
    }

    // A blank line at a browser prompt means "continue", so these never reach R.
    fn is_ignorable(&self) -> bool {
        self.text.as_deref().map_or(false, |t| {
            let t = t.trim();
            t.is_empty() || t.starts_with('#')
        })
    }
}

/// Sequential access to the script's lines.
#[derive(Debug, Clone)]
pub struct ScriptReader {
    lines: Vec<String>,
    current: ScriptLine,
    next: usize,
}

impl ScriptReader {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::from_source(&fs::read_to_string(path)?))
    }

    pub fn from_source(source: &str) -> Self {
        Self {
            lines: source.lines().map(str::to_string).collect(),
            current: ScriptLine::nop(),
            next: 0,
        }
    }

    pub fn current_line(&self) -> &ScriptLine {
        &self.current
    }

    pub fn next_line(&self) -> ScriptLine {
        match self.lines.get(self.next) {
            Some(text) => ScriptLine {
                text: Some(text.clone()),
                number: self.next as i32 + 1,
            },
            None => ScriptLine::nop(),
        }
    }

    pub fn advance(&mut self) {
        self.current = self.next_line();
        if self.next < self.lines.len() {
            self.next += 1;
        }
    }

    fn skip_ignorable(&mut self) {
        while self.next_line().is_ignorable() {
            self.advance();
        }
    }
}

/// The top-level frame: feeds the script to the interpreter one statement at a time.
#[derive(Debug)]
pub struct ScriptDebugger {
    reader: ScriptReader,
    location: Location,
}

impl ScriptDebugger {
    pub fn new(reader: ScriptReader) -> Self {
        let mut debugger = Self {
            reader,
            location: Location::main(NO_LINE),
        };
        debugger.update_location();
        debugger
    }

    fn update_location(&mut self) {
        self.reader.skip_ignorable();
        self.location.line = self.reader.next_line().number;
    }

    /// True when the statement entered a traced call.
    fn run_statement(&mut self, ctx: &mut StepContext<'_>, mut command: String) -> DebuggerResult<bool> {
        loop {
            let result = ctx.execute_expecting(&command, &STATEMENT_RESPONSES)?;

            match result.kind {
                ResponseType::Plus => {
                    self.reader.advance();
                    match self.reader.current_line().text.clone() {
                        Some(next) => command = next,
                        None => {
                            return Err(unexpected(
                                &command,
                                &result,
                                &[ResponseType::Empty, ResponseType::Response],
                            ))
                        }
                    }
                }
                ResponseType::DebuggingIn => {
                    let factory = ctx.factory;
                    let child = factory.function_debugger(ctx)?;
                    ctx.handler.append_debugger(child);
                    return Ok(true);
                }
                _ => {
                    ctx.emit(result.output_text());
                    VarHandler.load_functions(ctx)?;
                    return Ok(false);
                }
            }
        }
    }
}

impl FrameDebugger for ScriptDebugger {
    fn advance(&mut self, ctx: &mut StepContext<'_>) -> DebuggerResult<()> {
        self.reader.skip_ignorable();
        self.reader.advance();
        let Some(command) = self.reader.current_line().text.clone() else {
            self.location.line = NO_LINE;
            return Ok(());
        };

        match self.run_statement(ctx, command) {
            // Stays on the calling statement until the callee returns.
            Ok(true) => Ok(()),
            outcome => {
                self.update_location();
                outcome.map(|_| ())
            }
        }
    }

    fn resume_after_call(&mut self) {
        self.update_location();
    }

    fn has_next(&self) -> bool {
        self.location.line != NO_LINE
    }

    fn location(&self) -> &Location {
        &self.location
    }

    fn take_result(&mut self) -> Option<String> {
        None
    }
}
