use super::StepContext;
use crate::error::DebuggerResult;
use crate::interpreter::{ResponseType, LS_FUNCTIONS_COMMAND};
use tracing::debug;

/// Names starting with this belong to the debugger and are never instrumented.
pub const SERVICE_FUNCTION_PREFIX: &str = ".rdbg_";
pub const SERVICE_ENTER_FUNCTION_SUFFIX: &str = "_enter";
pub const SERVICE_EXIT_FUNCTION_SUFFIX: &str = "_exit";

/// Makes functions visible in the current frame steppable by tracing them with
/// name-echoing hooks and marking them for debugging.
#[derive(Debug, Default, Clone, Copy)]
pub struct VarHandler;

impl VarHandler {
    pub fn load_functions(&self, ctx: &mut StepContext<'_>) -> DebuggerResult<()> {
        let listing = ctx.execute_expecting(LS_FUNCTIONS_COMMAND, &[ResponseType::Response])?;

        for name in function_names(listing.output_text()) {
            if !name.starts_with(SERVICE_FUNCTION_PREFIX) {
                self.instrument(ctx, &name)?;
            }
        }
        Ok(())
    }

    pub fn instrument(&self, ctx: &mut StepContext<'_>, name: &str) -> DebuggerResult<()> {
        debug!(name, "instrumenting function");
        for (command, expected) in instrumentation_commands(name) {
            ctx.execute_expecting(&command, &[expected])?;
        }
        Ok(())
    }
}

/// Commands that hook up one function, each with the only response it may produce.
pub fn instrumentation_commands(name: &str) -> [(String, ResponseType); 4] {
    let function = quoted(name);
    let enter = quoted(&format!(
        "{SERVICE_FUNCTION_PREFIX}{name}{SERVICE_ENTER_FUNCTION_SUFFIX}"
    ));
    let exit = quoted(&format!(
        "{SERVICE_FUNCTION_PREFIX}{name}{SERVICE_EXIT_FUNCTION_SUFFIX}"
    ));
    let echo = name.replace('\\', "\\\\").replace('"', "\\\"");

    [
        (
            format!("{enter} <- function() {{ print(\"{echo}\") }}"),
            ResponseType::Empty,
        ),
        (
            format!("{exit} <- function() {{ print(\"{echo}\") }}"),
            ResponseType::Empty,
        ),
        (
            format!("trace({function}, {enter}, exit = {exit})"),
            ResponseType::Response,
        ),
        (format!("debug({function})"), ResponseType::Empty),
    ]
}

/// Parses a printed character vector (`[1] "a" "b"`, `character(0)`).
pub fn function_names(listing: &str) -> Vec<String> {
    let mut names = Vec::new();

    for line in listing.lines().filter(|l| l.trim_start().starts_with('[')) {
        let mut rest = line;
        while let Some(start) = rest.find('"') {
            let tail = &rest[start + 1..];
            let Some(end) = tail.find('"') else { break };
            names.push(tail[..end].to_string());
            rest = &tail[end + 1..];
        }
    }

    names
}

pub(crate) fn quoted(name: &str) -> String {
    let mut chars = name.chars();
    let syntactic = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => true,
        Some('.') => !name[1..].starts_with(|c: char| c.is_ascii_digit()),
        _ => false,
    } && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');

    if syntactic {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "\\`"))
    }
}
