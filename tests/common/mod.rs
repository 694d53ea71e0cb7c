#![allow(dead_code)]

use r_debugger::debugger::{
    instrumentation_commands, BufferedOutput, FrameEvents, RFunctionDebuggerFactory, StepContext,
};
use r_debugger::error::{DebuggerError, DebuggerResult};
use r_debugger::interpreter::{classify, ExecutionResult, Interpreter, ResponseType, LS_FUNCTIONS_COMMAND};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct Exchange {
    command: String,
    body: String,
    error: String,
}

/// Replays console transcripts: every command must arrive in the scripted order
/// and gets the scripted text back, classified the same way a live session would.
#[derive(Default)]
pub struct ScriptedInterpreter {
    exchanges: VecDeque<Exchange>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `body` is everything R prints after the command, prompt included.
    pub fn expect(self, command: &str, body: &str) -> Self {
        self.expect_with_error(command, body, "")
    }

    pub fn expect_with_error(mut self, command: &str, body: &str, error: &str) -> Self {
        self.exchanges.push_back(Exchange {
            command: command.to_string(),
            body: body.to_string(),
            error: error.to_string(),
        });
        self
    }

    pub fn step(self, body: &str) -> Self {
        self.expect("n", body)
    }

    pub fn no_functions(self, level: u32) -> Self {
        self.expect(LS_FUNCTIONS_COMMAND, &format!("character(0)\n{}", prompt(level)))
    }

    pub fn functions(self, level: u32, names: &[&str]) -> Self {
        let quoted: Vec<String> = names.iter().map(|n| format!("\"{}\"", n)).collect();
        self.expect(
            LS_FUNCTIONS_COMMAND,
            &format!("[1] {}\n{}", quoted.join(" "), prompt(level)),
        )
    }

    pub fn instrument(mut self, name: &str, level: u32) -> Self {
        for (command, expected) in instrumentation_commands(name) {
            let body = match expected {
                ResponseType::Response => format!("[1] \"{}\"\n{}", name, prompt(level)),
                _ => prompt(level),
            };
            self = self.expect(&command, &body);
        }
        self
    }

    pub fn sent(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }

    pub fn remaining(&self) -> usize {
        self.exchanges.len()
    }
}

impl Interpreter for ScriptedInterpreter {
    fn execute(&mut self, command: &str) -> DebuggerResult<ExecutionResult> {
        self.sent.lock().unwrap().push(command.to_string());

        let exchange = self
            .exchanges
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted command: {}", command));
        assert_eq!(exchange.command, command, "commands sent out of order");

        let raw = format!("{}\n{}", command, exchange.body);
        let response = classify(&raw).map_err(|e| DebuggerError::IncompleteResponse {
            command: command.to_string(),
            text: e.text,
        })?;
        Ok(ExecutionResult::new(response, exchange.error))
    }
}

pub fn prompt(level: u32) -> String {
    format!("Browse[{}]> ", level)
}

/// Runs `body` against a fresh step context and hands back what it produced.
pub fn run_in_context<T>(
    interpreter: &mut ScriptedInterpreter,
    body: impl FnOnce(&mut StepContext<'_>) -> T,
) -> (T, BufferedOutput, FrameEvents) {
    let factory = RFunctionDebuggerFactory;
    let mut sink = BufferedOutput::new();
    let mut events = FrameEvents::default();

    let value = {
        let mut ctx = StepContext {
            interpreter,
            factory: &factory,
            sink: &mut sink,
            handler: &mut events,
        };
        body(&mut ctx)
    };

    (value, sink, events)
}

// Console transcripts for a brace-bodied `f` and an expression-bodied `g`,
// both instrumented with the name-echoing hooks.

pub fn debugging_in(name: &str, level: u32) -> String {
    format!(
        "debugging in: {name}()\ndebug: {{\n    .doTrace(.rdbg_{name}_enter(), \"on entry\")\n    {{\n        print(1)\n    }}\n}}\n{}",
        prompt(level)
    )
}

pub fn do_trace(name: &str, level: u32) -> String {
    format!("debug: .doTrace(.rdbg_{name}_enter(), \"on entry\")\n{}", prompt(level))
}

pub fn brace_entry(name: &str, level: u32) -> String {
    format!(
        "Tracing {name}() on entry \n[1] \"{name}\"\ndebug: {{\n    print(1)\n    x <- 2\n}}\n{}",
        prompt(level)
    )
}

pub fn unbrace_entry(name: &str, expr: &str, level: u32) -> String {
    format!(
        "Tracing {name}() on entry \n[1] \"{name}\"\ndebug: {expr}\n{}",
        prompt(level)
    )
}

pub fn debug_at(line: i32, statement: &str, level: u32) -> String {
    format!("debug at #{line}: {statement}\n{}", prompt(level))
}

pub fn exit_trace(name: &str) -> String {
    format!("Tracing {name}() on exit \n[1] \"{name}\"\nexiting from: {name}()")
}
