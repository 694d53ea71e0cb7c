use super::{
    unexpected, BodyShape, FrameDebugger, FunctionDebugger, ScriptDebugger, ScriptReader,
    StepContext,
};
use crate::error::DebuggerResult;
use crate::interpreter::{
    is_current_line, is_trace_entry, ExecutionResult, ResponseType, DEBUG_AT_PREFIX,
    EXECUTE_AND_STEP_COMMAND, TRACING_PREFIX,
};
use tracing::debug;

/// Wrapper steps allowed before the trace entry; the entry itself takes one more.
const WRAPPER_STEPS: usize = 3;

const WRAPPER_RESPONSES: [ResponseType; 3] = [
    ResponseType::Response,
    ResponseType::StartTraceBrace,
    ResponseType::StartTraceUnbrace,
];

const START_TRACE: [ResponseType; 2] = [ResponseType::StartTraceBrace, ResponseType::StartTraceUnbrace];

pub trait FunctionDebuggerFactory: Send {
    /// Called right after a step reported a call being entered.
    fn function_debugger(&self, ctx: &mut StepContext<'_>) -> DebuggerResult<Box<dyn FrameDebugger>>;

    fn script_debugger(&self, reader: ScriptReader) -> Box<dyn FrameDebugger>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RFunctionDebuggerFactory;

impl FunctionDebuggerFactory for RFunctionDebuggerFactory {
    fn function_debugger(&self, ctx: &mut StepContext<'_>) -> DebuggerResult<Box<dyn FrameDebugger>> {
        let entry = find_entry(ctx)?;
        debug!(name = %entry.name, shape = ?entry.shape, "entering function");
        Ok(Box::new(FunctionDebugger::start(ctx, entry.name, entry.shape)?))
    }

    fn script_debugger(&self, reader: ScriptReader) -> Box<dyn FrameDebugger> {
        Box::new(ScriptDebugger::new(reader))
    }
}

/// A traced call that has just reached its entry hook.
#[derive(Debug)]
pub struct TraceEntry {
    pub name: String,
    pub shape: BodyShape,
    pub result: ExecutionResult,
}

/// Steps through the trace wrapper until the entry hook has run.
pub fn find_entry(ctx: &mut StepContext<'_>) -> DebuggerResult<TraceEntry> {
    let mut wrapper_steps = 0;
    loop {
        let result = ctx.execute(EXECUTE_AND_STEP_COMMAND)?;

        if let Some(shape) = BodyShape::from_start_trace(result.kind) {
            return Ok(TraceEntry {
                name: entered_name(&result.output),
                shape,
                result,
            });
        }
        if wrapper_steps == WRAPPER_STEPS {
            return Err(unexpected(EXECUTE_AND_STEP_COMMAND, &result, &START_TRACE));
        }
        if !is_wrapper_step(&result) {
            return Err(unexpected(EXECUTE_AND_STEP_COMMAND, &result, &WRAPPER_RESPONSES));
        }
        wrapper_steps += 1;
    }
}

// Plain output, or the unnumbered `debug: .doTrace(...)` pause inside the wrapper.
fn is_wrapper_step(result: &ExecutionResult) -> bool {
    match result.kind {
        ResponseType::Response => true,
        ResponseType::DebugAt => result
            .output
            .lines()
            .find(|line| is_current_line(line))
            .map_or(false, |line| line.starts_with(DEBUG_AT_PREFIX)),
        _ => false,
    }
}

// The entry hook prints `[1] "name"` right below the trace line; fall back to
// the traced call itself.
fn entered_name(text: &str) -> String {
    let mut lines = text.lines();
    let trace = lines.next().unwrap_or_default();

    let echoed = lines
        .next()
        .and_then(|l| l.strip_prefix("[1] \""))
        .and_then(|l| l.strip_suffix('"'));
    if let Some(name) = echoed {
        return name.to_string();
    }

    let call = if is_trace_entry(trace) {
        trace.strip_prefix(TRACING_PREFIX).unwrap_or(trace)
    } else {
        trace
    };
    call.split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_string()
}
