use super::{
    evaluator, FrameDebugger, FrameHandler, FunctionDebuggerFactory, Location, OutputSink,
    ScriptReader, StepContext, Variable,
};
use crate::error::DebuggerResult;
use crate::interpreter::Interpreter;
use tracing::{debug, warn};

/// Stack changes requested by a frame during one step.
#[derive(Default)]
pub struct FrameEvents {
    pub appended: Vec<Box<dyn FrameDebugger>>,
    pub drop_frames: usize,
    pub return_line: Option<i32>,
}

impl FrameHandler for FrameEvents {
    fn append_debugger(&mut self, debugger: Box<dyn FrameDebugger>) {
        self.appended.push(debugger);
    }

    fn set_drop_frames(&mut self, count: usize) {
        self.drop_frames = count;
    }

    fn set_return_line_number(&mut self, line: i32) {
        self.return_line = Some(line);
    }
}

/// Owns the interpreter channel and the stack of active frames, script frame at the bottom.
pub struct DebugContext {
    interpreter: Box<dyn Interpreter + Send>,
    factory: Box<dyn FunctionDebuggerFactory>,
    sink: Box<dyn OutputSink>,
    frames: Vec<Box<dyn FrameDebugger>>,
    last_result: Option<String>,
}

impl DebugContext {
    pub fn new(
        interpreter: Box<dyn Interpreter + Send>,
        factory: Box<dyn FunctionDebuggerFactory>,
        sink: Box<dyn OutputSink>,
        reader: ScriptReader,
    ) -> Self {
        let main = factory.script_debugger(reader);
        Self {
            interpreter,
            factory,
            sink,
            frames: vec![main],
            last_result: None,
        }
    }

    pub fn has_next(&self) -> bool {
        self.frames.last().map_or(false, |f| f.has_next())
    }

    /// Runs one step of the innermost frame. `Ok(false)` means nothing was left to run.
    pub fn advance(&mut self) -> DebuggerResult<bool> {
        let Some(top) = self.frames.last_mut() else {
            return Ok(false);
        };
        if !top.has_next() {
            return Ok(false);
        }

        let mut events = FrameEvents::default();
        let outcome = {
            let mut ctx = StepContext {
                interpreter: &mut *self.interpreter,
                factory: &*self.factory,
                sink: &mut *self.sink,
                handler: &mut events,
            };
            top.advance(&mut ctx)
        };

        if let Err(error) = outcome {
            if !error.is_fatal() {
                warn!(%error, "step ended by an interpreter error");
            }
            return Err(error);
        }

        self.apply(events);
        Ok(true)
    }

    fn apply(&mut self, events: FrameEvents) {
        let finished = self.frames.len() > 1 && self.frames.last().map_or(false, |f| !f.has_next());
        if finished {
            if let Some(mut frame) = self.frames.pop() {
                debug!(function = %frame.location().function_name, dropped = events.drop_frames, "frame returned");
                self.last_result = frame.take_result();
            }
            let keep = self.frames.len().saturating_sub(events.drop_frames).max(1);
            self.frames.truncate(keep);
            if let Some(caller) = self.frames.last_mut() {
                caller.resume_after_call();
            }
        }

        if let Some(line) = events.return_line {
            if let Some(top) = self.frames.last_mut() {
                top.set_return_line(line);
            }
        }

        self.frames.extend(events.appended);
    }

    /// Runs `expression` at the current pause without moving any frame.
    pub fn evaluate(&mut self, expression: &str) -> DebuggerResult<String> {
        self.inspect(|ctx| evaluator::evaluate(ctx, expression))
    }

    pub fn condition_holds(&mut self, condition: &str) -> DebuggerResult<bool> {
        self.inspect(|ctx| evaluator::condition_holds(ctx, condition))
    }

    pub fn variables(&mut self) -> DebuggerResult<Vec<Variable>> {
        self.inspect(evaluator::variables)
    }

    fn inspect<T>(
        &mut self,
        body: impl FnOnce(&mut StepContext<'_>) -> DebuggerResult<T>,
    ) -> DebuggerResult<T> {
        let mut events = FrameEvents::default();
        let mut ctx = StepContext {
            interpreter: &mut *self.interpreter,
            factory: &*self.factory,
            sink: &mut *self.sink,
            handler: &mut events,
        };
        body(&mut ctx)
    }

    /// Innermost frame's position.
    pub fn location(&self) -> Option<&Location> {
        self.frames.last().map(|f| f.location())
    }

    /// Innermost first.
    pub fn stack(&self) -> Vec<Location> {
        self.frames.iter().rev().map(|f| f.location().clone()).collect()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Output captured from the most recently returned frame.
    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }
}
