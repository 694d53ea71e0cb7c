use super::protocol::{encode, read_message, DapMessage, DapMessageContent};
use crate::config::RunConfig;
use crate::debugger::{
    Breakpoints, DebugContext, Location, OutputRecord, OutputSink, RFunctionDebuggerFactory,
    ScriptReader, MAIN_FUNCTION_NAME,
};
use crate::error::{DebuggerError, DebuggerResult};
use crate::executor::{lock, DebugEvent, DebugWorker, StepRequest, StopReason};
use crate::interpreter::{RSession, Terminator};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

const THREAD_ID: u64 = 1;
const LOCALS_REFERENCE: u64 = 1;
const NO_SESSION: &str = "No active debug session";

/// Serializes outgoing messages; shared by the request loop, the event
/// forwarder and the output sink.
pub struct DapWriter {
    seq: AtomicU64,
    out: Mutex<Box<dyn Write + Send>>,
}

impl DapWriter {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            seq: AtomicU64::new(0),
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn response(
        &self,
        request_seq: u64,
        command: &str,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) {
        self.send(DapMessageContent::Response {
            request_seq,
            success,
            command: command.to_string(),
            message,
            body,
        });
    }

    pub fn event(&self, event: &str, body: Option<Value>) {
        self.send(DapMessageContent::Event {
            event: event.to_string(),
            body,
        });
    }

    fn send(&self, content: DapMessageContent) {
        let msg = DapMessage::new(self.seq.fetch_add(1, Ordering::SeqCst) + 1, content);
        let framed = match encode(&msg) {
            Ok(framed) => framed,
            Err(e) => {
                warn!(error = %e, "could not encode DAP message");
                return;
            }
        };

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(framed.as_bytes()).and_then(|_| out.flush()) {
            warn!(error = %e, "could not write DAP message");
        }
    }
}

/// Program output as DAP `output` events.
struct DapOutput {
    writer: Arc<DapWriter>,
}

impl OutputSink for DapOutput {
    fn receive(&mut self, record: OutputRecord) {
        let category = if record.is_error { "stderr" } else { "stdout" };
        let mut output = record.text;
        if !output.ends_with('\n') {
            output.push('\n');
        }
        self.writer
            .event("output", Some(json!({ "category": category, "output": output })));
    }
}

pub struct DapServer {
    writer: Arc<DapWriter>,
    breakpoints: Arc<Mutex<Breakpoints>>,
    frames: Arc<Mutex<Vec<Location>>>,
    worker: Option<DebugWorker>,
    forwarder: Option<JoinHandle<()>>,
    script_path: Option<PathBuf>,
    stop_on_entry: bool,
}

impl DapServer {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(DapWriter::new(out)),
            breakpoints: Arc::new(Mutex::new(Breakpoints::new())),
            frames: Arc::new(Mutex::new(Vec::new())),
            worker: None,
            forwarder: None,
            script_path: None,
            stop_on_entry: true,
        }
    }

    pub fn serve<R: BufRead>(&mut self, mut input: R) -> io::Result<()> {
        while let Some(msg) = read_message(&mut input)? {
            if !msg.is_request() {
                debug!(msg_type = %msg.msg_type, "ignoring non-request message");
                continue;
            }
            let DapMessageContent::Request { command, arguments } = msg.content else {
                continue;
            };

            debug!(%command, seq = msg.seq, "request");
            if !self.handle(msg.seq, &command, arguments) {
                break;
            }
        }

        self.shutdown();
        Ok(())
    }

    /// False once the client asked to disconnect.
    fn handle(&mut self, seq: u64, command: &str, arguments: Option<Value>) -> bool {
        match command {
            "initialize" => self.handle_initialize(seq, command),
            "launch" => self.handle_launch(seq, command, arguments),
            "setBreakpoints" => self.handle_set_breakpoints(seq, command, arguments),
            "configurationDone" => {
                self.writer.response(seq, command, true, None, None);
                if !self.stop_on_entry {
                    self.submit(StepRequest::Resume);
                }
            }
            "threads" => {
                let body = json!({ "threads": [{ "id": THREAD_ID, "name": "main" }] });
                self.writer.response(seq, command, true, None, Some(body));
            }
            "stackTrace" => self.handle_stack_trace(seq, command),
            "scopes" => self.handle_scopes(seq, command),
            "variables" => {
                self.inspect(seq, command, StepRequest::Variables { id: seq });
            }
            "evaluate" => {
                let expression = arguments
                    .as_ref()
                    .and_then(|a| a.get("expression"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match expression {
                    Some(expression) => {
                        self.inspect(seq, command, StepRequest::Evaluate { id: seq, expression })
                    }
                    None => {
                        let message = Some("Missing expression".to_string());
                        self.writer.response(seq, command, false, message, None);
                    }
                }
            }
            "continue" => {
                let body = json!({ "allThreadsContinued": true });
                self.step_with_body(seq, command, StepRequest::Resume, Some(body));
            }
            "next" => self.step(seq, command, StepRequest::StepOver),
            "stepIn" => self.step(seq, command, StepRequest::StepInto),
            "stepOut" => self.step(seq, command, StepRequest::StepOut),
            "disconnect" | "terminate" => {
                self.shutdown();
                self.writer.response(seq, command, true, None, None);
                return false;
            }
            _ => {
                warn!(command, "unsupported DAP request");
                let message = Some(format!("Unsupported request: {}", command));
                self.writer.response(seq, command, false, message, None);
            }
        }
        true
    }

    fn handle_initialize(&mut self, seq: u64, command: &str) {
        let body = json!({
            "supportsConfigurationDoneRequest": true,
            "supportsStepBack": false,
            "supportsFunctionBreakpoints": false,
            "supportsConditionalBreakpoints": true,
            "supportsEvaluateForHovers": false,
            "supportsTerminateRequest": true,
        });
        self.writer.response(seq, command, true, None, Some(body));
        self.writer.event("initialized", None);
    }

    fn handle_launch(&mut self, seq: u64, command: &str, arguments: Option<Value>) {
        let config = match arguments.map(serde_json::from_value::<RunConfig>).transpose() {
            Ok(config) => config.unwrap_or_default(),
            Err(e) => {
                let message = Some(format!("Invalid launch arguments: {}", e));
                self.writer.response(seq, command, false, message, None);
                return;
            }
        };

        let started = self
            .launch(&config)
            .and_then(|(context, terminator)| {
                self.start_worker(context, Some(terminator), config.stop_on_entry)
            });
        match started {
            Ok(events) => {
                self.script_path = Some(config.script_path.clone());
                self.writer.response(seq, command, true, None, None);
                self.forward(events);
            }
            Err(e) => {
                warn!(error = %e, "launch failed");
                self.writer.response(seq, command, false, Some(e.to_string()), None);
            }
        }
    }

    /// Debugs an already prepared context, as `launch` does once R is running.
    pub fn attach(
        &mut self,
        context: DebugContext,
        terminator: Option<Arc<dyn Terminator>>,
        stop_on_entry: bool,
    ) -> DebuggerResult<()> {
        let events = self.start_worker(context, terminator, stop_on_entry)?;
        self.forward(events);
        Ok(())
    }

    fn launch(&mut self, config: &RunConfig) -> DebuggerResult<(DebugContext, Arc<dyn Terminator>)> {
        config.validate()?;
        let reader = ScriptReader::open(&config.script_path).map_err(|e| {
            DebuggerError::Config(format!(
                "Cannot read {}: {}",
                config.script_path.display(),
                e
            ))
        })?;

        info!(script = %config.script_path.display(), "launching");
        let session = RSession::start(config)?;
        let terminator = session.terminator();
        let context = DebugContext::new(
            Box::new(session),
            Box::new(RFunctionDebuggerFactory),
            Box::new(DapOutput {
                writer: Arc::clone(&self.writer),
            }),
            reader,
        );
        Ok((context, terminator))
    }

    fn start_worker(
        &mut self,
        context: DebugContext,
        terminator: Option<Arc<dyn Terminator>>,
        stop_on_entry: bool,
    ) -> DebuggerResult<Receiver<DebugEvent>> {
        let (tx, events) = channel();
        let mut worker = DebugWorker::spawn(context, Arc::clone(&self.breakpoints), tx)?;
        if let Some(terminator) = terminator {
            worker = worker.with_terminator(terminator);
        }

        self.worker = Some(worker);
        self.stop_on_entry = stop_on_entry;
        Ok(events)
    }

    fn forward(&mut self, events: Receiver<DebugEvent>) {
        let writer = Arc::clone(&self.writer);
        let frames = Arc::clone(&self.frames);
        let announce_entry = self.stop_on_entry;
        self.forwarder = Some(thread::spawn(move || {
            forward_events(events, &writer, &frames, announce_entry)
        }));
    }

    fn handle_set_breakpoints(&mut self, seq: u64, command: &str, arguments: Option<Value>) {
        let points: Vec<(i32, Option<String>)> = arguments
            .as_ref()
            .and_then(|a| a.get("breakpoints"))
            .and_then(Value::as_array)
            .map(|points| points.iter().filter_map(source_breakpoint).collect())
            .unwrap_or_default();

        lock(&self.breakpoints).replace_lines(MAIN_FUNCTION_NAME, &points);

        let verified: Vec<Value> = points
            .iter()
            .map(|(line, _)| json!({ "verified": true, "line": line }))
            .collect();
        self.writer
            .response(seq, command, true, None, Some(json!({ "breakpoints": verified })));
    }

    fn handle_scopes(&mut self, seq: u64, command: &str) {
        let scopes = if self.worker.is_some() {
            json!([{ "name": "Locals", "variablesReference": LOCALS_REFERENCE, "expensive": false }])
        } else {
            json!([])
        };
        self.writer
            .response(seq, command, true, None, Some(json!({ "scopes": scopes })));
    }

    fn handle_stack_trace(&mut self, seq: u64, command: &str) {
        let frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner).clone();

        let stack_frames: Vec<Value> = frames
            .iter()
            .enumerate()
            .map(|(i, location)| {
                let mut frame = json!({
                    "id": i + 1,
                    "name": location.function_name,
                    "line": location.line.max(0),
                    "column": 1,
                });
                if location.is_main() {
                    if let Some(path) = &self.script_path {
                        frame["source"] = json!({
                            "name": path.file_name().map(|n| n.to_string_lossy().into_owned()),
                            "path": path.display().to_string(),
                        });
                    }
                }
                frame
            })
            .collect();

        let body = json!({ "stackFrames": stack_frames, "totalFrames": frames.len() });
        self.writer.response(seq, command, true, None, Some(body));
    }

    fn step(&mut self, seq: u64, command: &str, request: StepRequest) {
        self.step_with_body(seq, command, request, None);
    }

    // The response goes out first so it always precedes the resulting `stopped` event.
    fn step_with_body(&mut self, seq: u64, command: &str, request: StepRequest, body: Option<Value>) {
        if self.worker.is_none() {
            let message = Some(NO_SESSION.to_string());
            self.writer.response(seq, command, false, message, None);
            return;
        }
        self.writer.response(seq, command, true, None, body);
        if !self.submit(request) {
            warn!(command, "debug worker already stopped");
        }
    }

    /// The forwarder writes the response once the worker answers.
    fn inspect(&mut self, seq: u64, command: &str, request: StepRequest) {
        if !self.submit(request) {
            let message = Some(NO_SESSION.to_string());
            self.writer.response(seq, command, false, message, None);
        }
    }

    fn submit(&self, request: StepRequest) -> bool {
        self.worker.as_ref().map_or(false, |w| w.submit(request))
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.join();
        }
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.join();
        }
    }
}

fn forward_events(
    events: Receiver<DebugEvent>,
    writer: &DapWriter,
    frames: &Mutex<Vec<Location>>,
    announce_entry: bool,
) {
    for event in events {
        match event {
            DebugEvent::Stopped {
                reason,
                frames: stack,
                message,
                ..
            } => {
                *frames.lock().unwrap_or_else(PoisonError::into_inner) = stack;
                if reason == StopReason::Entry && !announce_entry {
                    continue;
                }
                writer.event(
                    "stopped",
                    Some(json!({
                        "reason": reason.as_str(),
                        "threadId": THREAD_ID,
                        "allThreadsStopped": true,
                        "text": message,
                    })),
                );
            }
            DebugEvent::Evaluated { id, result } => match result {
                Ok(printed) => writer.response(
                    id,
                    "evaluate",
                    true,
                    None,
                    Some(json!({ "result": printed, "variablesReference": 0 })),
                ),
                Err(message) => writer.response(id, "evaluate", false, Some(message), None),
            },
            DebugEvent::Variables { id, result } => match result {
                Ok(variables) => {
                    let variables: Vec<Value> = variables
                        .iter()
                        .map(|v| {
                            let mut variable = json!({
                                "name": v.name,
                                "value": v.value,
                                "variablesReference": 0,
                            });
                            if v.is_function {
                                variable["type"] = json!("function");
                            }
                            variable
                        })
                        .collect();
                    writer.response(
                        id,
                        "variables",
                        true,
                        None,
                        Some(json!({ "variables": variables })),
                    );
                }
                Err(message) => writer.response(id, "variables", false, Some(message), None),
            },
            DebugEvent::Terminated => {
                writer.event("terminated", None);
                break;
            }
            DebugEvent::Failed { message } => {
                writer.event(
                    "output",
                    Some(json!({ "category": "stderr", "output": format!("{}\n", message) })),
                );
                writer.event("terminated", None);
                break;
            }
        }
    }
}

/// Line and condition of one DAP `SourceBreakpoint`.
fn source_breakpoint(point: &Value) -> Option<(i32, Option<String>)> {
    let line = point.get("line").and_then(Value::as_i64)?;
    let line = i32::try_from(line).ok()?;
    let condition = point
        .get("condition")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Some((line, condition))
}
