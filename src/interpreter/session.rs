use super::{classify, is_complete, ExecutionResult, Interpreter, Terminator, BROWSER_COMMAND};
use crate::config::RunConfig;
use crate::error::{DebuggerError, DebuggerResult};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An R process parked at a `Browse[n]>` prompt.
///
/// R does not echo piped input, so the command text is prepended to every
/// response as its echo line before classification.
pub struct RSession {
    child: Arc<Mutex<Child>>,
    stdin: ChildStdin,
    stdout: ChildStdout,
    errors: Receiver<String>,
    settle: Duration,
}

impl RSession {
    pub fn start(config: &RunConfig) -> DebuggerResult<Self> {
        let (program, args) = config.command_line()?;
        let working_directory = config.working_directory()?;

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(&working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !config.pass_parent_envs {
            command.env_clear();
        }
        command.envs(&config.envs);

        info!(program = %program.display(), ?args, cwd = %working_directory.display(), "starting interpreter");
        let mut child = command.spawn().map_err(|source| DebuggerError::ChannelIo {
            command: program.display().to_string(),
            text: String::new(),
            source,
        })?;

        let stdin = take_pipe(child.stdin.take(), "stdin")?;
        let stdout = take_pipe(child.stdout.take(), "stdout")?;
        let stderr = take_pipe(child.stderr.take(), "stderr")?;

        let (tx, errors) = channel::<String>();
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut session = Self {
            child: Arc::new(Mutex::new(child)),
            stdin,
            stdout,
            errors,
            settle: Duration::from_millis(config.stderr_settle_ms),
        };

        for init in &config.init_commands {
            session.write_line(init)?;
        }
        session.write_line(BROWSER_COMMAND)?;
        let banner = session.read_until_complete(BROWSER_COMMAND)?;
        let startup_errors = session.drain_errors();
        debug!(%banner, %startup_errors, "interpreter ready");

        Ok(session)
    }

    pub fn terminator(&self) -> Arc<dyn Terminator> {
        Arc::new(ProcessTerminator {
            child: Arc::clone(&self.child),
        })
    }

    fn write_line(&mut self, command: &str) -> DebuggerResult<()> {
        debug!(command, "sending");
        self.stdin
            .write_all(command.as_bytes())
            .and_then(|_| self.stdin.write_all(b"\n"))
            .and_then(|_| self.stdin.flush())
            .map_err(|source| DebuggerError::ChannelIo {
                command: command.to_string(),
                text: String::new(),
                source,
            })
    }

    fn read_until_complete(&mut self, command: &str) -> DebuggerResult<String> {
        let mut bytes = format!("{command}\n").into_bytes();
        let mut buffer = [0u8; 4096];

        loop {
            let read = self.stdout.read(&mut buffer).map_err(|source| DebuggerError::ChannelIo {
                command: command.to_string(),
                text: String::from_utf8_lossy(&bytes).into_owned(),
                source,
            })?;

            if read == 0 {
                return Err(DebuggerError::ChannelIo {
                    command: command.to_string(),
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                    source: io::Error::new(io::ErrorKind::UnexpectedEof, "interpreter closed its output"),
                });
            }

            bytes.extend_from_slice(&buffer[..read]);
            let text = String::from_utf8_lossy(&bytes);
            if is_complete(&text) {
                return Ok(text.into_owned());
            }
        }
    }

    fn drain_errors(&mut self) -> String {
        let mut collected = String::new();
        loop {
            match self.errors.recv_timeout(self.settle) {
                Ok(line) => {
                    collected.push_str(&line);
                    collected.push('\n');
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        collected
    }
}

impl Interpreter for RSession {
    fn execute(&mut self, command: &str) -> DebuggerResult<ExecutionResult> {
        self.write_line(command)?;
        let text = self.read_until_complete(command)?;
        let error = self.drain_errors();

        let response = classify(&text).map_err(|e| DebuggerError::IncompleteResponse {
            command: command.to_string(),
            text: e.text,
        })?;
        debug!(command, kind = ?response.kind, "received");

        Ok(ExecutionResult::new(response, error))
    }
}

impl Drop for RSession {
    fn drop(&mut self) {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = child.kill() {
            warn!(error = %e, "could not kill interpreter");
        }
        let _ = child.wait();
        info!("interpreter stopped");
    }
}

/// Kills the R process; the session's blocked read then ends with EOF.
pub struct ProcessTerminator {
    child: Arc<Mutex<Child>>,
}

impl Terminator for ProcessTerminator {
    fn terminate(&self) {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match child.kill() {
            Ok(()) => info!("interpreter killed"),
            Err(e) => debug!(error = %e, "interpreter already gone"),
        }
    }
}

fn take_pipe<T>(pipe: Option<T>, name: &str) -> DebuggerResult<T> {
    pipe.ok_or_else(|| DebuggerError::ChannelIo {
        command: String::new(),
        text: String::new(),
        source: io::Error::new(io::ErrorKind::BrokenPipe, format!("no {name} pipe")),
    })
}
