use std::fmt::Write as _;

use renderer::Diagnostic;

/// Lines of context printed on each side of the failing line.
const CONTEXT_LINES: u32 = 2;

/// Renders a diagnostic with the surrounding source, marking the failing line.
pub fn render_diagnostic(source: &str, diagnostic: &Diagnostic) -> String {
    let mut out = String::new();
    let message = diagnostic.message.trim_end();
    let Some(line) = diagnostic.line else {
        let _ = writeln!(out, "error: {message}");
        return out;
    };

    let _ = writeln!(out, "error at line {line}: {message}");
    let first = line.saturating_sub(CONTEXT_LINES).max(1);
    let last = line.saturating_add(CONTEXT_LINES);
    let width = last.to_string().len();
    for (number, text) in (1u32..).zip(source.lines()) {
        if number < first {
            continue;
        }
        if number > last {
            break;
        }
        let marker = if number == line { '>' } else { ' ' };
        let _ = writeln!(out, "{marker} {number:>width$} | {text}");
    }
    out
}
