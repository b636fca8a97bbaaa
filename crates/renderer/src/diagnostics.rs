//! Structured compile/link diagnostics extracted from driver info logs.
//!
//! Drivers report fragment errors as `ERROR: <source>:<line>: <detail>`. We
//! only care about the line so editors can highlight it; the message is always
//! the raw log.

use std::fmt;

const ERROR_TAG: &str = "ERROR: ";

/// A compile or link failure ready for display next to the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Full, unmodified info log.
    pub message: String,
    /// 1-based source line, when the log names one.
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message.trim_end()),
            None => f.write_str(self.message.trim_end()),
        }
    }
}

/// Parses a stage compile log.
pub fn parse_log(log: &str) -> Diagnostic {
    Diagnostic {
        message: log.to_string(),
        line: find_line(log),
    }
}

/// Parses a link log. Link failures are never attributed to a line.
pub fn parse_link_log(log: &str) -> Diagnostic {
    Diagnostic {
        message: log.to_string(),
        line: None,
    }
}

/// Returns the line of the first `ERROR: <digits>:<digits>:` occurrence.
fn find_line(log: &str) -> Option<u32> {
    let mut rest = log;
    while let Some(index) = rest.find(ERROR_TAG) {
        rest = &rest[index + ERROR_TAG.len()..];
        if let Some(line) = match_location(rest) {
            return (line > 0).then_some(line);
        }
    }
    None
}

/// Matches `<digits>:<digits>:` at the start of `text`.
fn match_location(text: &str) -> Option<u32> {
    let after_source = skip_digits(text)?.strip_prefix(':')?;
    let digits_len = after_source
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 || !after_source[digits_len..].starts_with(':') {
        return None;
    }
    after_source[..digits_len].parse().ok()
}

fn skip_digits(text: &str) -> Option<&str> {
    let count = text.bytes().take_while(u8::is_ascii_digit).count();
    (count > 0).then(|| &text[count..])
}
