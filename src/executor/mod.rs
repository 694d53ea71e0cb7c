mod runner;
mod worker;

pub use runner::{parse_command, run_console, ConsoleCommand};
pub(crate) use worker::lock;
pub use worker::{DebugEvent, DebugWorker, StepRequest, StopReason};
