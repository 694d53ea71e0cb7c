use clap::Parser;
use r_debugger::config::RunConfig;
use r_debugger::debugger::{
    Breakpoints, ConsoleOutput, DebugContext, RFunctionDebuggerFactory, ScriptReader,
};
use r_debugger::error::DebuggerError;
use r_debugger::executor::{run_console, DebugWorker};
use r_debugger::dap;
use r_debugger::interpreter::RSession;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "r-debugger", version, about = "Step-through debugger for R scripts")]
struct Cli {
    /// Serve the Debug Adapter Protocol on stdin/stdout.
    #[arg(long, alias = "debug-adapter")]
    dap: bool,

    /// Script to debug in the interactive console.
    script: Option<PathBuf>,

    /// R executable.
    #[arg(long, default_value = "R")]
    interpreter: PathBuf,

    /// Working directory; defaults to the script's directory.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Arguments passed to the script, shell-quoted.
    #[arg(long = "args", default_value = "", allow_hyphen_values = true)]
    script_args: String,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "r_debugger=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let outcome = if cli.dap {
        dap::run_dap_mode().map_err(|e| e.to_string())
    } else {
        run_interactive_mode(cli).map_err(|e| e.to_string())
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn run_interactive_mode(cli: Cli) -> Result<(), DebuggerError> {
    let Some(script) = cli.script else {
        return Err(DebuggerError::Config(
            "The R script is not specified".to_string(),
        ));
    };

    let config = RunConfig {
        interpreter_path: cli.interpreter,
        working_directory: cli.cwd,
        script_args: cli.script_args,
        ..RunConfig::for_script(script)
    };
    config.validate()?;

    let source = std::fs::read_to_string(&config.script_path).map_err(|e| {
        DebuggerError::Config(format!("Cannot read {}: {}", config.script_path.display(), e))
    })?;
    let lines: Vec<String> = source.lines().map(str::to_string).collect();

    let session = RSession::start(&config)?;
    let terminator = session.terminator();
    let context = DebugContext::new(
        Box::new(session),
        Box::new(RFunctionDebuggerFactory),
        Box::new(ConsoleOutput),
        ScriptReader::from_source(&source),
    );

    let breakpoints = Arc::new(Mutex::new(Breakpoints::new()));
    let (tx, events) = channel();
    let worker =
        DebugWorker::spawn(context, Arc::clone(&breakpoints), tx)?.with_terminator(terminator);

    let stdin = io::stdin();
    run_console(&worker, &events, &breakpoints, &lines, stdin.lock(), io::stderr())?;

    worker.join();
    Ok(())
}
