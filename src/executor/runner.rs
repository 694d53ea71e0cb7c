use super::worker::lock;
use super::{DebugEvent, DebugWorker, StepRequest};
use crate::debugger::{Breakpoints, Location};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::Receiver;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Step(StepRequest),
    /// Line and an optional R condition.
    Break(i32, Option<String>),
    Delete(i32),
    Print(String),
    Variables,
    Where,
    Quit,
}

pub fn parse_command(input: &str) -> Option<ConsoleCommand> {
    let input = input.trim();
    let (head, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
    let rest = rest.trim();
    let (first, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let line = first.parse::<i32>().ok();
    let tail = tail.trim();

    let command = match (head, line) {
        ("c" | "continue", _) => ConsoleCommand::Step(StepRequest::Resume),
        ("n" | "next" | "stepOver", _) => ConsoleCommand::Step(StepRequest::StepOver),
        // Empty input steps into, like pressing enter at a browser prompt.
        ("" | "s" | "stepIn" | "stepInto", _) => ConsoleCommand::Step(StepRequest::StepInto),
        ("o" | "out" | "stepOut", _) => ConsoleCommand::Step(StepRequest::StepOut),
        ("r" | "run", Some(line)) => {
            ConsoleCommand::Step(StepRequest::RunToPosition(Location::main(line)))
        }
        ("b" | "break", Some(line)) => {
            ConsoleCommand::Break(line, (!tail.is_empty()).then(|| tail.to_string()))
        }
        ("d" | "delete", Some(line)) => ConsoleCommand::Delete(line),
        ("p" | "print", _) if !rest.is_empty() => ConsoleCommand::Print(rest.to_string()),
        ("v" | "vars", _) => ConsoleCommand::Variables,
        ("w" | "where", _) => ConsoleCommand::Where,
        ("q" | "quit", _) => ConsoleCommand::Quit,
        _ => return None,
    };
    Some(command)
}

/// Drives a worker from a line-oriented console until the script ends or the user quits.
pub fn run_console<R: BufRead, W: Write>(
    worker: &DebugWorker,
    events: &Receiver<DebugEvent>,
    breakpoints: &Mutex<Breakpoints>,
    source: &[String],
    mut input: R,
    mut out: W,
) -> io::Result<()> {
    let mut frames = Vec::new();
    let mut next_id = 0u64;

    while let Ok(event) = events.recv() {
        match event {
            DebugEvent::Stopped {
                reason,
                location,
                frames: stack,
                message,
            } => {
                if let Some(message) = message {
                    writeln!(out, "Error: {}", message)?;
                }
                writeln!(out, "Stopped ({}) at {}", reason.as_str(), location)?;
                if location.is_main() {
                    if let Some(text) = usize::try_from(location.line - 1)
                        .ok()
                        .and_then(|i| source.get(i))
                    {
                        writeln!(out, "{:>4} | {}", location.line, text)?;
                    }
                }
                frames = stack;
            }
            DebugEvent::Terminated => {
                writeln!(out, "Script finished")?;
                return Ok(());
            }
            DebugEvent::Failed { message } => {
                writeln!(out, "Debug session failed: {}", message)?;
                return Ok(());
            }
            // Answers only arrive while the loop below waits for them.
            DebugEvent::Evaluated { .. } | DebugEvent::Variables { .. } => continue,
        }

        loop {
            write!(
                out,
                "Commands: (c)ontinue, (n)ext, (s)tepIn, (o)ut, (r)un <line>, (b)reak <line> [cond], (d)elete <line>, (p)rint <expr>, (v)ars, (w)here, (q)uit\n> "
            )?;
            out.flush()?;

            let mut buf = String::new();
            if input.read_line(&mut buf)? == 0 {
                worker.submit(StepRequest::Stop);
                return Ok(());
            }

            match parse_command(buf.trim()) {
                Some(ConsoleCommand::Step(request)) => {
                    if !worker.submit(request) {
                        return Ok(());
                    }
                    break;
                }
                Some(ConsoleCommand::Break(line, condition)) => {
                    let location = Location::main(line);
                    match condition {
                        Some(condition) => {
                            writeln!(out, "Breakpoint set at line {} if {}", line, condition)?;
                            lock(breakpoints).add_conditional(location, condition);
                        }
                        None => {
                            lock(breakpoints).add(location);
                            writeln!(out, "Breakpoint set at line {}", line)?;
                        }
                    }
                }
                Some(ConsoleCommand::Print(expression)) => {
                    next_id += 1;
                    let request = StepRequest::Evaluate {
                        id: next_id,
                        expression,
                    };
                    if !worker.submit(request) || !await_answer(events, next_id, &mut out)? {
                        return Ok(());
                    }
                }
                Some(ConsoleCommand::Variables) => {
                    next_id += 1;
                    if !worker.submit(StepRequest::Variables { id: next_id })
                        || !await_answer(events, next_id, &mut out)?
                    {
                        return Ok(());
                    }
                }
                Some(ConsoleCommand::Delete(line)) => {
                    lock(breakpoints).remove(&Location::main(line));
                    writeln!(out, "Breakpoint removed from line {}", line)?;
                }
                Some(ConsoleCommand::Where) => {
                    for (depth, frame) in frames.iter().enumerate() {
                        writeln!(out, "  #{}: {}", depth, frame)?;
                    }
                }
                Some(ConsoleCommand::Quit) => {
                    worker.submit(StepRequest::Stop);
                    return Ok(());
                }
                None => writeln!(out, "Unknown command: {}", buf.trim())?,
            }
        }
    }

    Ok(())
}

/// Prints the answer to request `id`. False when the session ended instead.
fn await_answer<W: Write>(
    events: &Receiver<DebugEvent>,
    id: u64,
    out: &mut W,
) -> io::Result<bool> {
    while let Ok(event) = events.recv() {
        match event {
            DebugEvent::Evaluated { id: answered, result } if answered == id => {
                match result {
                    Ok(printed) => writeln!(out, "{}", printed)?,
                    Err(message) => writeln!(out, "Error: {}", message)?,
                }
                return Ok(true);
            }
            DebugEvent::Variables { id: answered, result } if answered == id => {
                match result {
                    Ok(variables) => {
                        for variable in variables {
                            writeln!(out, "{} = {}", variable.name, variable.value)?;
                        }
                    }
                    Err(message) => writeln!(out, "Error: {}", message)?,
                }
                return Ok(true);
            }
            DebugEvent::Failed { message } => {
                writeln!(out, "Debug session failed: {}", message)?;
                return Ok(false);
            }
            DebugEvent::Terminated => {
                writeln!(out, "Script finished")?;
                return Ok(false);
            }
            _ => {}
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_commands() {
        assert_eq!(parse_command("c"), Some(ConsoleCommand::Step(StepRequest::Resume)));
        assert_eq!(parse_command(""), Some(ConsoleCommand::Step(StepRequest::StepInto)));
        assert_eq!(parse_command("b 12"), Some(ConsoleCommand::Break(12, None)));
        assert_eq!(
            parse_command("b 12 x > 1"),
            Some(ConsoleCommand::Break(12, Some("x > 1".to_string())))
        );
        assert_eq!(
            parse_command("p  sum(1, 2)"),
            Some(ConsoleCommand::Print("sum(1, 2)".to_string()))
        );
        assert_eq!(parse_command("p"), None);
        assert_eq!(parse_command("v"), Some(ConsoleCommand::Variables));
        assert_eq!(
            parse_command("r 4"),
            Some(ConsoleCommand::Step(StepRequest::RunToPosition(Location::main(4))))
        );
        assert_eq!(parse_command("b"), None);
        assert_eq!(parse_command("xyz"), None);
    }
}
