use super::var_handler::quoted;
use super::{function_names, StepContext};
use crate::error::{DebuggerError, DebuggerResult};
use crate::interpreter::{ResponseType, LS_FUNCTIONS_COMMAND};
use std::collections::HashSet;
use tracing::warn;

pub const LS_COMMAND: &str = "ls()";

const EVALUATION_RESPONSES: [ResponseType; 2] = [ResponseType::Response, ResponseType::Empty];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub is_function: bool,
}

/// Wraps `expression` so that R parses it as a whole; a syntax error comes
/// back as an `Error` instead of a continuation prompt.
pub fn evaluation_command(expression: &str) -> String {
    let escaped = expression
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r");
    format!("eval(parse(text = \"{escaped}\"))")
}

/// Printed value of `expression` in the innermost frame.
pub fn evaluate(ctx: &mut StepContext<'_>, expression: &str) -> DebuggerResult<String> {
    let result = ctx.execute_expecting(&evaluation_command(expression), &EVALUATION_RESPONSES)?;
    Ok(result.output_text().to_string())
}

/// False when the condition is not exactly `TRUE` or fails to evaluate.
pub fn condition_holds(ctx: &mut StepContext<'_>, condition: &str) -> DebuggerResult<bool> {
    match evaluate(ctx, &format!("isTRUE({condition})")) {
        Ok(printed) => Ok(printed.trim() == "[1] TRUE"),
        Err(error) if !error.is_fatal() => {
            warn!(condition, %error, "breakpoint condition failed");
            Ok(false)
        }
        Err(error) => Err(error),
    }
}

/// Every binding visible in the innermost frame with its printed value.
pub fn variables(ctx: &mut StepContext<'_>) -> DebuggerResult<Vec<Variable>> {
    let listing = ctx.execute_expecting(LS_COMMAND, &[ResponseType::Response])?;
    let names = function_names(listing.output_text());

    let listing = ctx.execute_expecting(LS_FUNCTIONS_COMMAND, &[ResponseType::Response])?;
    let functions: HashSet<String> = function_names(listing.output_text()).into_iter().collect();

    let mut variables = Vec::with_capacity(names.len());
    for name in names {
        let is_function = functions.contains(&name);
        let value = match ctx.execute_expecting(&quoted(&name), &[ResponseType::Response]) {
            Ok(result) if is_function => function_value(result.output_text()),
            Ok(result) => result.output_text().to_string(),
            Err(DebuggerError::InterpreterRuntime { message, .. }) => message,
            Err(error) => return Err(error),
        };
        variables.push(Variable {
            name,
            value,
            is_function,
        });
    }
    Ok(variables)
}

// A traced function prints a two-line banner and a closing hint around its
// original definition.
fn function_value(printed: &str) -> String {
    let lines: Vec<&str> = printed.lines().collect();
    if lines.len() < 3 {
        return printed.to_string();
    }
    lines[2..lines.len() - 1].join("\n").trim_end().to_string()
}
