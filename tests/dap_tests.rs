mod common;

use common::*;
use r_debugger::dap::DapServer;
use r_debugger::debugger::{
    evaluation_command, BufferedOutput, DebugContext, RFunctionDebuggerFactory, ScriptReader,
    LS_COMMAND,
};
use serde_json::{json, Value};
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn framed(requests: &[Value]) -> Cursor<Vec<u8>> {
    let mut input = String::new();
    for (i, request) in requests.iter().enumerate() {
        let mut request = request.clone();
        request["seq"] = json!(i + 1);
        request["type"] = json!("request");
        let body = request.to_string();
        input.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));
    }
    Cursor::new(input.into_bytes())
}

fn messages(buffer: &SharedBuffer) -> Vec<Value> {
    let bytes = buffer.0.lock().unwrap().clone();
    let mut text = String::from_utf8(bytes).unwrap();
    let mut out = Vec::new();

    while let Some((header, rest)) = text.split_once("\r\n\r\n") {
        let length: usize = header
            .trim_start_matches("Content-Length: ")
            .parse()
            .unwrap();
        out.push(serde_json::from_str(&rest[..length]).unwrap());
        text = rest[length..].to_string();
    }
    out
}

fn serve(requests: &[Value]) -> Vec<Value> {
    let buffer = SharedBuffer::default();
    let mut server = DapServer::new(buffer.clone());
    server.serve(framed(requests)).unwrap();
    messages(&buffer)
}

/// Serves `requests` against a session already paused on entry.
fn serve_attached(interpreter: ScriptedInterpreter, source: &str, requests: &[Value]) -> Vec<Value> {
    let context = DebugContext::new(
        Box::new(interpreter),
        Box::new(RFunctionDebuggerFactory),
        Box::new(BufferedOutput::new()),
        ScriptReader::from_source(source),
    );
    let buffer = SharedBuffer::default();
    let mut server = DapServer::new(buffer.clone());
    server.attach(context, None, true).unwrap();
    server.serve(framed(requests)).unwrap();
    messages(&buffer)
}

fn position(messages: &[Value], matches: impl Fn(&Value) -> bool) -> usize {
    messages
        .iter()
        .position(matches)
        .unwrap_or_else(|| panic!("message not found in {:?}", messages))
}

fn response<'a>(messages: &'a [Value], command: &str) -> &'a Value {
    messages
        .iter()
        .find(|m| m["type"] == "response" && m["command"] == command)
        .unwrap_or_else(|| panic!("no response to {}", command))
}

#[cfg(test)]
mod dap_server_tests {
    use super::*;

    #[test]
    fn test_initialize_announces_capabilities() {
        let out = serve(&[json!({ "command": "initialize", "arguments": { "adapterID": "r" } })]);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["type"], "response");
        assert_eq!(out[0]["request_seq"], 1);
        assert_eq!(out[0]["success"], true);
        assert_eq!(out[0]["body"]["supportsConfigurationDoneRequest"], true);
        assert_eq!(out[0]["body"]["supportsConditionalBreakpoints"], true);
        assert_eq!(out[1]["type"], "event");
        assert_eq!(out[1]["event"], "initialized");
        assert_eq!(out[1]["seq"], 2);
    }

    #[test]
    fn test_threads_and_empty_stack() {
        let out = serve(&[
            json!({ "command": "threads" }),
            json!({ "command": "stackTrace", "arguments": { "threadId": 1 } }),
        ]);

        let threads = response(&out, "threads");
        assert_eq!(threads["body"]["threads"][0]["id"], 1);

        let stack = response(&out, "stackTrace");
        assert_eq!(stack["body"]["totalFrames"], 0);
    }

    #[test]
    fn test_set_breakpoints_verifies_lines() {
        let out = serve(&[json!({
            "command": "setBreakpoints",
            "arguments": {
                "source": { "path": "/tmp/script.R" },
                "breakpoints": [{ "line": 3 }, { "line": 7 }]
            }
        })]);

        let body = &response(&out, "setBreakpoints")["body"];
        assert_eq!(
            body["breakpoints"],
            json!([{ "verified": true, "line": 3 }, { "verified": true, "line": 7 }])
        );
    }

    #[test]
    fn test_launch_without_script_fails() {
        let out = serve(&[json!({ "command": "launch", "arguments": { "interpreterPath": "R" } })]);

        let launch = response(&out, "launch");
        assert_eq!(launch["success"], false);
        assert!(launch["message"]
            .as_str()
            .unwrap()
            .contains("The R script is not specified"));
    }

    #[test]
    fn test_launch_with_missing_script_fails() {
        let out = serve(&[json!({
            "command": "launch",
            "arguments": { "program": "/nonexistent/dir/missing.R" }
        })]);

        let launch = response(&out, "launch");
        assert_eq!(launch["success"], false);
        assert!(launch["message"].as_str().unwrap().contains("Cannot read"));
    }

    #[test]
    fn test_launch_rejects_malformed_arguments() {
        let out = serve(&[json!({ "command": "launch", "arguments": { "stopOnEntry": "yes" } })]);

        let launch = response(&out, "launch");
        assert_eq!(launch["success"], false);
        assert!(launch["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid launch arguments"));
    }

    #[test]
    fn test_step_without_session_is_refused() {
        let out = serve(&[json!({ "command": "next", "arguments": { "threadId": 1 } })]);

        let next = response(&out, "next");
        assert_eq!(next["success"], false);
        assert_eq!(next["message"], "No active debug session");
    }

    #[test]
    fn test_unknown_request_is_refused() {
        let out = serve(&[json!({ "command": "stepBack", "arguments": { "threadId": 1 } })]);

        let step_back = response(&out, "stepBack");
        assert_eq!(step_back["success"], false);
        assert_eq!(step_back["message"], "Unsupported request: stepBack");
    }

    #[test]
    fn test_inspection_without_session_is_refused() {
        let out = serve(&[
            json!({ "command": "evaluate", "arguments": { "expression": "x" } }),
            json!({ "command": "continue", "arguments": { "threadId": 1 } }),
            json!({ "command": "scopes", "arguments": { "frameId": 1 } }),
        ]);

        let evaluate = response(&out, "evaluate");
        assert_eq!(evaluate["success"], false);
        assert_eq!(evaluate["message"], "No active debug session");
        assert_eq!(response(&out, "continue")["success"], false);
        assert_eq!(response(&out, "scopes")["body"]["scopes"], json!([]));
    }

    #[test]
    fn test_continue_is_answered_before_the_breakpoint_stop() {
        let interpreter = ScriptedInterpreter::new()
            .expect("x <- 1", &prompt(1))
            .no_functions(1)
            .expect(
                &evaluation_command("isTRUE(x > 0)"),
                &format!("[1] TRUE\n{}", prompt(1)),
            );
        let out = serve_attached(
            interpreter,
            "x <- 1\nprint(x)\n",
            &[
                json!({
                    "command": "setBreakpoints",
                    "arguments": {
                        "source": { "path": "/tmp/script.R" },
                        "breakpoints": [{ "line": 2, "condition": "x > 0" }]
                    }
                }),
                json!({ "command": "continue", "arguments": { "threadId": 1 } }),
            ],
        );

        let answered = position(&out, |m| m["type"] == "response" && m["command"] == "continue");
        let stopped = position(&out, |m| m["event"] == "stopped" && m["body"]["reason"] == "breakpoint");
        assert!(answered < stopped);
        assert_eq!(response(&out, "continue")["body"]["allThreadsContinued"], true);
    }

    #[test]
    fn test_evaluate_and_variables_at_pause() {
        let interpreter = ScriptedInterpreter::new()
            .expect(&evaluation_command("x + 1"), &format!("[1] 3\n{}", prompt(1)))
            .expect(LS_COMMAND, &format!("[1] \"f\" \"x\"\n{}", prompt(1)))
            .functions(1, &["f"])
            .expect("f", &format!("function() 1\n{}", prompt(1)))
            .expect("x", &format!("[1] 2\n{}", prompt(1)));
        let out = serve_attached(
            interpreter,
            "print(x)\n",
            &[
                json!({ "command": "evaluate", "arguments": { "expression": "x + 1", "frameId": 1 } }),
                json!({ "command": "scopes", "arguments": { "frameId": 1 } }),
                json!({ "command": "variables", "arguments": { "variablesReference": 1 } }),
            ],
        );

        let evaluate = response(&out, "evaluate");
        assert_eq!(evaluate["request_seq"], 1);
        assert_eq!(evaluate["body"]["result"], "[1] 3");

        let scopes = response(&out, "scopes");
        assert_eq!(scopes["body"]["scopes"][0]["name"], "Locals");
        assert_eq!(scopes["body"]["scopes"][0]["variablesReference"], 1);

        let variables = response(&out, "variables");
        assert_eq!(
            variables["body"]["variables"],
            json!([
                { "name": "f", "value": "function() 1", "type": "function", "variablesReference": 0 },
                { "name": "x", "value": "[1] 2", "variablesReference": 0 }
            ])
        );
    }

    #[test]
    fn test_disconnect_ends_serving() {
        let out = serve(&[
            json!({ "command": "disconnect" }),
            json!({ "command": "threads" }),
        ]);

        assert_eq!(out.len(), 1);
        assert_eq!(response(&out, "disconnect")["success"], true);
    }
}
