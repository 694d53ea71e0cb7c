use super::{
    factory::find_entry, unexpected, FrameDebugger, Location, StepContext, VarHandler, NO_LINE,
};
use crate::error::DebuggerResult;
use crate::interpreter::{
    is_current_line, ExecutionResult, ResponseType, DEBUG_AT_LABEL_PREFIX, DEBUG_AT_LINE_PREFIX,
    EXECUTE_AND_STEP_COMMAND, EXITING_FROM, LINE_SEPARATOR,
};
use tracing::debug;

/// How a function's body was written, decided once when the frame is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    /// `function() { ... }`: stepping reports a line for every statement.
    Brace,
    /// `function() expr`: a single expression, always reported as line 1.
    Unbrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Paused at another statement of this body.
    Current,
    /// The step entered a traced callee.
    Descend,
    /// This call returned and a new traced call started in the same step.
    ReEnter,
    Exit,
    RecursiveExit,
    /// Nothing happened worth reporting.
    Idle,
    /// The expression finished without an exit trace.
    Finish,
}

const BRACE_TRANSITIONS: &[(ResponseType, Transition)] = &[
    (ResponseType::DebugAt, Transition::Current),
    (ResponseType::DebuggingIn, Transition::Descend),
    (ResponseType::ContinueTrace, Transition::ReEnter),
    (ResponseType::ExitingFrom, Transition::Exit),
    (ResponseType::RecursiveExitingFrom, Transition::RecursiveExit),
    (ResponseType::Empty, Transition::Idle),
];

const UNBRACE_TRANSITIONS: &[(ResponseType, Transition)] = &[
    (ResponseType::DebugAt, Transition::Current),
    (ResponseType::DebuggingIn, Transition::Descend),
    (ResponseType::ContinueTrace, Transition::ReEnter),
    (ResponseType::ExitingFrom, Transition::Exit),
    (ResponseType::RecursiveExitingFrom, Transition::RecursiveExit),
    (ResponseType::Empty, Transition::Finish),
];

impl BodyShape {
    pub fn from_start_trace(kind: ResponseType) -> Option<Self> {
        match kind {
            ResponseType::StartTraceBrace => Some(BodyShape::Brace),
            ResponseType::StartTraceUnbrace => Some(BodyShape::Unbrace),
            _ => None,
        }
    }

    pub fn start_trace_kind(self) -> ResponseType {
        match self {
            BodyShape::Brace => ResponseType::StartTraceBrace,
            BodyShape::Unbrace => ResponseType::StartTraceUnbrace,
        }
    }

    fn transitions(self) -> &'static [(ResponseType, Transition)] {
        match self {
            BodyShape::Brace => BRACE_TRANSITIONS,
            BodyShape::Unbrace => UNBRACE_TRANSITIONS,
        }
    }

    fn transition(self, kind: ResponseType) -> Option<Transition> {
        self.transitions()
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|&(_, t)| t)
    }

    fn accepted(self) -> Vec<ResponseType> {
        self.transitions().iter().map(|&(k, _)| k).collect()
    }
}

/// Steps one traced call of an R function.
#[derive(Debug)]
pub struct FunctionDebugger {
    shape: BodyShape,
    location: Location,
    done: bool,
    result: Option<String>,
}

impl FunctionDebugger {
    /// Builds the frame right after the trace entry was seen and leaves it
    /// paused at its first stoppable position.
    pub fn start(
        ctx: &mut StepContext<'_>,
        name: impl Into<String>,
        shape: BodyShape,
    ) -> DebuggerResult<Self> {
        let mut debugger = Self {
            shape,
            location: Location::new(name, 1),
            done: false,
            result: None,
        };
        debugger.enter(ctx)?;
        Ok(debugger)
    }

    pub fn shape(&self) -> BodyShape {
        self.shape
    }

    fn enter(&mut self, ctx: &mut StepContext<'_>) -> DebuggerResult<()> {
        match self.shape {
            BodyShape::Brace => {
                let result =
                    ctx.execute_expecting(EXECUTE_AND_STEP_COMMAND, &[ResponseType::DebugAt])?;
                self.pause_at(ctx, result)?;
            }
            BodyShape::Unbrace => self.location.line = 1,
        }
        VarHandler.load_functions(ctx)
    }

    fn pause_at(&mut self, ctx: &mut StepContext<'_>, result: ExecutionResult) -> DebuggerResult<()> {
        ctx.emit(result.output_text());

        let marker = current_line_marker(&result.output, result.output_range.end);
        if self.shape == BodyShape::Brace {
            if let Some(line) = marker.and_then(line_number) {
                self.location.line = line;
            }
        }

        if marker.map_or(false, is_brace_loop) {
            let next = ctx.execute_expecting(EXECUTE_AND_STEP_COMMAND, &[ResponseType::DebugAt])?;
            return self.pause_at(ctx, next);
        }
        Ok(())
    }

    fn re_enter(&mut self, ctx: &mut StepContext<'_>, result: ExecutionResult) -> DebuggerResult<()> {
        ctx.emit(result.output_text());

        let entry = find_entry(ctx)?;
        if entry.shape != self.shape {
            return Err(unexpected(
                EXECUTE_AND_STEP_COMMAND,
                &entry.result,
                &[self.shape.start_trace_kind()],
            ));
        }

        debug!(from = %self.location.function_name, to = %entry.name, "call re-entered");
        self.location.function_name = entry.name;
        self.enter(ctx)
    }

    fn exit(
        &mut self,
        ctx: &mut StepContext<'_>,
        result: ExecutionResult,
        recursive: bool,
    ) -> DebuggerResult<()> {
        let output = result.output_text().to_string();
        ctx.emit(&output);

        if recursive {
            let frames = result
                .output
                .lines()
                .filter(|l| l.starts_with(EXITING_FROM))
                .count();
            ctx.handler.set_drop_frames(frames.saturating_sub(1));
        }

        let marker = current_line_marker(&result.output, after_last_exit(&result.output));
        let mut return_line = marker.and_then(line_number);

        if marker.map_or(false, is_brace_loop) {
            let next = ctx.execute_expecting(EXECUTE_AND_STEP_COMMAND, &[ResponseType::DebugAt])?;
            ctx.emit(next.output_text());
            if let Some(line) =
                current_line_marker(&next.output, next.output_range.end).and_then(line_number)
            {
                return_line = Some(line);
            }
        }

        if let Some(line) = return_line {
            ctx.handler.set_return_line_number(line);
        }

        self.finish(output);
        Ok(())
    }

    fn finish(&mut self, result: String) {
        debug!(function = %self.location.function_name, "frame finished");
        self.result = Some(result);
        self.done = true;
        self.location.line = NO_LINE;
    }
}

impl FrameDebugger for FunctionDebugger {
    fn advance(&mut self, ctx: &mut StepContext<'_>) -> DebuggerResult<()> {
        if self.done {
            return Ok(());
        }

        let result = ctx.execute(EXECUTE_AND_STEP_COMMAND)?;
        let Some(transition) = self.shape.transition(result.kind) else {
            return Err(unexpected(
                EXECUTE_AND_STEP_COMMAND,
                &result,
                &self.shape.accepted(),
            ));
        };

        match transition {
            Transition::Current => {
                self.pause_at(ctx, result)?;
                VarHandler.load_functions(ctx)
            }
            Transition::Descend => {
                let factory = ctx.factory;
                let child = factory.function_debugger(ctx)?;
                ctx.handler.append_debugger(child);
                Ok(())
            }
            Transition::ReEnter => self.re_enter(ctx, result),
            Transition::Exit => self.exit(ctx, result, false),
            Transition::RecursiveExit => self.exit(ctx, result, true),
            Transition::Idle => Ok(()),
            Transition::Finish => {
                self.finish(String::new());
                Ok(())
            }
        }
    }

    fn has_next(&self) -> bool {
        !self.done
    }

    fn location(&self) -> &Location {
        &self.location
    }

    fn take_result(&mut self) -> Option<String> {
        self.result.take()
    }

    fn set_return_line(&mut self, line: i32) {
        if self.shape == BodyShape::Brace && !self.done {
            self.location.line = line;
        }
    }
}

/// Text from the first current-line marker at or after `from` to the end.
fn current_line_marker(text: &str, from: usize) -> Option<&str> {
    let mut offset = from;
    for line in text.get(from..)?.split_inclusive(LINE_SEPARATOR) {
        if is_current_line(line) {
            return Some(&text[offset..]);
        }
        offset += line.len();
    }
    None
}

fn after_last_exit(text: &str) -> usize {
    let mut offset = 0;
    let mut after = 0;
    for line in text.split_inclusive(LINE_SEPARATOR) {
        offset += line.len();
        if line.starts_with(EXITING_FROM) {
            after = offset;
        }
    }
    after
}

fn line_number(marker: &str) -> Option<i32> {
    let rest = marker
        .strip_prefix(DEBUG_AT_LINE_PREFIX)
        .or_else(|| marker.strip_prefix(DEBUG_AT_LABEL_PREFIX))?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

// `for (...) {`, `while (...) {` or `repeat {` as the reported statement.
fn is_brace_loop(marker: &str) -> bool {
    let Some(first) = marker.lines().next() else {
        return false;
    };
    let Some((_, statement)) = first.split_once(": ") else {
        return false;
    };

    let is_loop = ["for", "while", "repeat"].iter().any(|keyword| {
        statement
            .strip_prefix(keyword)
            .map_or(false, |rest| rest.starts_with([' ', '(', '{']))
    });
    is_loop && first.trim_end().ends_with('{')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_line_numbers() {
        assert_eq!(line_number("debug at #12: x <- 1"), Some(12));
        assert_eq!(line_number("Debug at 1: print(c(1))"), Some(1));
        assert_eq!(line_number("debug: x + 1"), None);
    }

    #[test]
    fn recognizes_braced_loop_headers() {
        assert!(is_brace_loop("debug at #1: for (i in 1:2) {\n    ls()\n}"));
        assert!(is_brace_loop("debug at #3: while (TRUE) {"));
        assert!(is_brace_loop("debug: repeat {"));
        assert!(!is_brace_loop("debug at #1: for (i in 1:2) print(i)"));
        assert!(!is_brace_loop("debug at #2: format(x) {"));
        assert!(!is_brace_loop("debug at #1: i"));
    }

    #[test]
    fn finds_marker_after_output() {
        let text = "[1] 1\ndebug at #2: ls()";
        assert_eq!(current_line_marker(text, 5), Some("debug at #2: ls()"));
        assert_eq!(current_line_marker("[1] 1", 5), None);
    }

    #[test]
    fn skips_past_exit_lines() {
        let text = "Tracing f() on exit\n[1] \"f\"\nexiting from: f()\ndebug at #3: y";
        let offset = after_last_exit(text);
        assert_eq!(&text[offset..], "debug at #3: y");
    }
}
