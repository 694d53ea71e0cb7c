use super::{
    ResponseType, BROWSE_PREFIX, BROWSE_SUFFIX, DEBUGGING_IN, DEBUG_AT_LABEL_PREFIX,
    DEBUG_AT_LINE_PREFIX, DEBUG_AT_PREFIX, EXITING_FROM, LINE_SEPARATOR, PLUS_AND_SPACE, TRACE_ENTRY_SUFFIX,
    TRACE_EXIT_SUFFIX, TRACING_PREFIX,
};
use std::ops::Range;

#[derive(Debug, thiserror::Error)]
#[error("response is not terminated by a prompt: {text:?}")]
pub struct IncompleteResponse {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedResponse {
    /// Body lines joined with `\n`; no echo line, no prompt.
    pub text: String,
    /// The console text as received.
    pub raw: String,
    pub kind: ResponseType,
    pub output_range: Range<usize>,
}

/// True once the accumulated text ends in a continuation marker or a browser prompt,
/// each sitting right after a line break.
pub fn is_complete(text: &str) -> bool {
    ends_with_continuation(text) || ends_with_browse_prompt(text)
}

fn ends_with_line_break(text: &str) -> bool {
    text.ends_with('\n') || text.ends_with('\r')
}

fn ends_with_continuation(text: &str) -> bool {
    text.strip_suffix(PLUS_AND_SPACE)
        .map_or(false, ends_with_line_break)
}

fn ends_with_browse_prompt(text: &str) -> bool {
    let Some(rest) = text.strip_suffix(BROWSE_SUFFIX) else {
        return false;
    };
    let before_digits = rest.trim_end_matches(|c: char| c.is_ascii_digit());
    if before_digits.len() == rest.len() {
        return false;
    }
    before_digits
        .strip_suffix(BROWSE_PREFIX)
        .map_or(false, ends_with_line_break)
}

pub fn classify(text: &str) -> Result<ClassifiedResponse, IncompleteResponse> {
    if !is_complete(text) {
        return Err(IncompleteResponse {
            text: text.to_string(),
        });
    }

    let lines = split_lines(text);
    let (kind, begin, end) = kind_and_bounds(&lines);
    Ok(assemble(&lines, kind, begin, end, text))
}

fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            _ => i += 1,
        }
    }

    lines.push(&text[start..]);
    lines
}

/// Line-index bounds `[begin, end)` of program output, counted over all lines
/// (index 0 is the command echo, the last index is the prompt).
fn kind_and_bounds(lines: &[&str]) -> (ResponseType, usize, usize) {
    let n = lines.len();

    if lines[n - 1] == PLUS_AND_SPACE {
        return (ResponseType::Plus, 1, n - 1);
    }
    if n == 2 {
        return (ResponseType::Empty, 1, 1);
    }

    try_debugging_in(lines)
        .or_else(|| try_continue_trace(lines))
        .or_else(|| try_end_trace(lines))
        .or_else(|| try_debug_at(lines))
        .or_else(|| try_start_trace(lines))
        .unwrap_or((ResponseType::Response, 1, n - 1))
}

fn try_debugging_in(lines: &[&str]) -> Option<(ResponseType, usize, usize)> {
    lines[1]
        .starts_with(DEBUGGING_IN)
        .then_some((ResponseType::DebuggingIn, 1, 1))
}

fn try_continue_trace(lines: &[&str]) -> Option<(ResponseType, usize, usize)> {
    let n = lines.len();

    for i in 1..n.saturating_sub(5) {
        if !(is_trace_exit(lines[i]) && lines[i + 2].starts_with(EXITING_FROM)) {
            continue;
        }

        let entering = (i + 3..n).find(|&j| lines[j].starts_with(DEBUGGING_IN))?;
        if i > 1 {
            return Some((ResponseType::ContinueTrace, 1, i));
        }

        let last_exit = (i + 2..entering)
            .rev()
            .find(|&j| lines[j].starts_with(EXITING_FROM))
            .unwrap_or(i + 2);
        return Some((ResponseType::ContinueTrace, last_exit + 1, entering));
    }

    None
}

fn try_end_trace(lines: &[&str]) -> Option<(ResponseType, usize, usize)> {
    let n = lines.len();
    let exits: Vec<usize> = (1..n.saturating_sub(3))
        .filter(|&i| is_trace_exit(lines[i]))
        .collect();

    let (&first, &last) = (exits.first()?, exits.last()?);
    let kind = if exits.len() == 1 {
        ResponseType::ExitingFrom
    } else {
        ResponseType::RecursiveExitingFrom
    };

    if first != 1 {
        return Some((kind, 1, first));
    }

    let begin = find_exiting_from(lines, last + 2) + 1;
    let end = find_current_line(lines, begin);
    Some((kind, begin, end))
}

fn try_debug_at(lines: &[&str]) -> Option<(ResponseType, usize, usize)> {
    let n = lines.len();
    if n <= 2 || is_trace_entry(lines[1]) {
        return None;
    }

    let index = find_current_line(lines, 1);
    (index < n - 1).then_some((ResponseType::DebugAt, 1, index))
}

fn try_start_trace(lines: &[&str]) -> Option<(ResponseType, usize, usize)> {
    if !is_trace_entry(lines[1]) {
        return None;
    }

    let kind = if lines.len() == 5 {
        ResponseType::StartTraceUnbrace
    } else {
        ResponseType::StartTraceBrace
    };
    Some((kind, 1, 1))
}

fn find_exiting_from(lines: &[&str], from: usize) -> usize {
    let mut index = from;
    while index < lines.len() - 1 && !lines[index].starts_with(EXITING_FROM) {
        index += 1;
    }
    index
}

fn find_current_line(lines: &[&str], from: usize) -> usize {
    let mut index = from;
    while index < lines.len() - 1 && !is_current_line(lines[index]) {
        index += 1;
    }
    index
}

pub(crate) fn is_current_line(line: &str) -> bool {
    [DEBUG_AT_LINE_PREFIX, DEBUG_AT_LABEL_PREFIX, DEBUG_AT_PREFIX]
        .iter()
        .any(|marker| line.starts_with(marker))
}

pub(crate) fn is_trace_entry(line: &str) -> bool {
    is_trace_line(line, TRACE_ENTRY_SUFFIX)
}

fn is_trace_exit(line: &str) -> bool {
    is_trace_line(line, TRACE_EXIT_SUFFIX)
}

// `Tracing <anything> on entry|exit` with optional trailing spaces.
fn is_trace_line(line: &str, suffix: &str) -> bool {
    line.strip_prefix(TRACING_PREFIX)
        .map_or(false, |rest| rest.trim_end_matches(' ').ends_with(suffix))
}

fn assemble(
    lines: &[&str],
    kind: ResponseType,
    begin: usize,
    end: usize,
    raw: &str,
) -> ClassifiedResponse {
    let n = lines.len();
    let last_body = n.saturating_sub(2);

    let mut text = String::new();
    let mut output_begin = 0;
    let mut output_end = 0;

    for (i, line) in lines.iter().enumerate().take(n - 1).skip(1) {
        let separated = i != last_body;

        text.push_str(line);
        if separated {
            text.push(LINE_SEPARATOR);
        }

        if i < begin {
            output_begin += line.len() + usize::from(separated);
        }
        if i < end {
            output_end += line.len() + usize::from(separated && i != end - 1);
        }
    }

    let output_range = if end <= begin {
        0..0
    } else {
        output_begin..output_end
    };

    ClassifiedResponse {
        text,
        raw: raw.to_string(),
        kind,
        output_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_mixed_line_breaks() {
        assert_eq!(split_lines("a\r\nb\rc\nd"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_lines("\nBrowse[1]> "), vec!["", "Browse[1]> "]);
    }

    #[test]
    fn matches_trace_lines() {
        assert!(is_trace_entry("Tracing f() on entry"));
        assert!(is_trace_entry("Tracing f(1, 2) on entry   "));
        assert!(!is_trace_entry("Tracing on entry"));
        assert!(is_trace_exit("Tracing g() on exit "));
        assert!(!is_trace_exit("Tracing g() on entry"));
    }
}
