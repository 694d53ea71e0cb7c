use crate::debugger::{Breakpoints, DebugContext, Hit, Location, RunMode, Variable, NO_LINE};
use crate::error::DebuggerResult;
use crate::interpreter::Terminator;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRequest {
    StepOver,
    StepInto,
    StepOut,
    Resume,
    RunToPosition(Location),
    /// Answered with `DebugEvent::Evaluated` carrying the same id.
    Evaluate {
        id: u64,
        expression: String,
    },
    /// Answered with `DebugEvent::Variables` carrying the same id.
    Variables {
        id: u64,
    },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Step,
    Breakpoint,
    Exception,
}

impl StopReason {
    /// DAP `stopped` event reason.
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Exception => "exception",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Stopped {
        reason: StopReason,
        location: Location,
        /// Innermost first.
        frames: Vec<Location>,
        message: Option<String>,
    },
    Evaluated {
        id: u64,
        result: Result<String, String>,
    },
    Variables {
        id: u64,
        result: Result<Vec<Variable>, String>,
    },
    Terminated,
    Failed {
        message: String,
    },
}

/// Runs every step of a session on one dedicated thread, in request order.
pub struct DebugWorker {
    requests: Sender<StepRequest>,
    handle: Option<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
    terminator: Option<Arc<dyn Terminator>>,
}

impl DebugWorker {
    /// Reports an `Entry` stop (or `Terminated` for an empty script) before
    /// taking requests.
    pub fn spawn(
        context: DebugContext,
        breakpoints: Arc<Mutex<Breakpoints>>,
        events: Sender<DebugEvent>,
    ) -> io::Result<Self> {
        let (requests, queue) = channel();
        let stopping = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            context,
            breakpoints,
            events,
            stopping: Arc::clone(&stopping),
        };
        let handle = thread::Builder::new()
            .name("r-debugger-worker".to_string())
            .spawn(move || worker.run(queue))?;

        Ok(Self {
            requests,
            handle: Some(handle),
            stopping,
            terminator: None,
        })
    }

    /// Called on shutdown so a step blocked on the interpreter returns.
    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// False once the worker has shut down.
    pub fn submit(&self, request: StepRequest) -> bool {
        debug!(?request, "request submitted");
        self.requests.send(request).is_ok()
    }

    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stopping.store(true, Ordering::SeqCst);
            let _ = self.requests.send(StepRequest::Stop);
            if let Some(terminator) = &self.terminator {
                terminator.terminate();
            }
            let _ = handle.join();
        }
    }
}

impl Drop for DebugWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn lock(breakpoints: &Mutex<Breakpoints>) -> MutexGuard<'_, Breakpoints> {
    breakpoints.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    context: DebugContext,
    breakpoints: Arc<Mutex<Breakpoints>>,
    events: Sender<DebugEvent>,
    stopping: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self, queue: Receiver<StepRequest>) {
        info!("debug worker started");
        if !self.context.has_next() {
            self.send(DebugEvent::Terminated);
            return;
        }
        self.send(self.stopped(StopReason::Entry, None));

        for request in queue {
            let keep_going = match request {
                StepRequest::Stop => false,
                StepRequest::Evaluate { id, expression } => {
                    let outcome = self.context.evaluate(&expression);
                    self.answer(outcome, |result| DebugEvent::Evaluated { id, result })
                }
                StepRequest::Variables { id } => {
                    let outcome = self.context.variables();
                    self.answer(outcome, |result| DebugEvent::Variables { id, result })
                }
                StepRequest::StepOver => self.step(RunMode::StepOver),
                StepRequest::StepInto => self.step(RunMode::StepInto),
                StepRequest::StepOut => self.step(RunMode::StepOut),
                StepRequest::Resume => self.step(RunMode::Continue),
                StepRequest::RunToPosition(target) => {
                    lock(&self.breakpoints).set_temporary(target);
                    let keep_going = self.step(RunMode::Continue);
                    lock(&self.breakpoints).clear_temporary();
                    keep_going
                }
            };
            if !keep_going {
                break;
            }
        }

        info!("debug worker exiting");
    }

    fn step(&mut self, mode: RunMode) -> bool {
        match self.run_step(mode) {
            Ok(Some(reason)) => {
                self.send(self.stopped(reason, None));
                true
            }
            Ok(None) => {
                info!(result = ?self.context.last_result(), "script finished");
                self.send(DebugEvent::Terminated);
                false
            }
            Err(e) if !e.is_fatal() => {
                self.send(self.stopped(StopReason::Exception, Some(e.to_string())));
                true
            }
            Err(e) => {
                self.fail(&e.to_string());
                false
            }
        }
    }

    /// Replies to an inspection request; a protocol failure still ends the session.
    fn answer<T>(
        &mut self,
        outcome: DebuggerResult<T>,
        event: impl FnOnce(Result<T, String>) -> DebugEvent,
    ) -> bool {
        match outcome {
            Ok(value) => {
                self.send(event(Ok(value)));
                true
            }
            Err(e) => {
                self.send(event(Err(e.to_string())));
                if e.is_fatal() {
                    self.fail(&e.to_string());
                }
                !e.is_fatal()
            }
        }
    }

    fn fail(&self, message: &str) {
        // A kill requested by shutdown ends the read with EOF; that is the normal end.
        if self.stopping.load(Ordering::SeqCst) {
            info!("interpreter terminated");
            self.send(DebugEvent::Terminated);
            return;
        }
        error!(error = message, "debug session failed");
        self.send(DebugEvent::Failed {
            message: message.to_string(),
        });
    }

    /// Advances until the mode says stop or a breakpoint is reached. `None` once
    /// the script has nothing left to run.
    fn run_step(&mut self, mode: RunMode) -> DebuggerResult<Option<StopReason>> {
        let start_depth = self.context.depth();

        loop {
            if !self.context.advance()? || !self.context.has_next() {
                return Ok(None);
            }
            let Some(location) = self.context.location() else {
                return Ok(None);
            };

            let hit = lock(&self.breakpoints).hit(location);
            let stop_here = match hit {
                Some(Hit::Stop) => true,
                Some(Hit::StopIf(condition)) => self.context.condition_holds(&condition)?,
                None => false,
            };
            if stop_here {
                return Ok(Some(StopReason::Breakpoint));
            }
            if mode.should_stop(start_depth, self.context.depth()) {
                return Ok(Some(StopReason::Step));
            }
        }
    }

    fn send(&self, event: DebugEvent) {
        if self.events.send(event).is_err() {
            warn!("nobody is listening for debug events");
        }
    }

    fn stopped(&self, reason: StopReason, message: Option<String>) -> DebugEvent {
        stopped(&self.context, reason, message)
    }
}

fn stopped(context: &DebugContext, reason: StopReason, message: Option<String>) -> DebugEvent {
    let frames = context.stack();
    let location = frames
        .first()
        .cloned()
        .unwrap_or_else(|| Location::main(NO_LINE));
    debug!(%location, reason = reason.as_str(), "stopped");

    DebugEvent::Stopped {
        reason,
        location,
        frames,
        message,
    }
}
