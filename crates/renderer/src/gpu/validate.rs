use std::error::Error as _;
use std::fmt::Write as _;

use wgpu::naga;
use wgpu::naga::front::glsl::{ErrorKind, ExpectedToken, Frontend, Options, ParseErrors, TokenValue};
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::backend::ShaderStage;

use super::translate::{translate_fragment, TranslatedShader};

/// Validates a fragment program without a GPU.
///
/// Returns the compile log on failure, formatted like a driver log so it can
/// go through [`crate::diagnostics::parse_log`].
pub fn validate_fragment(source: &str) -> Result<(), String> {
    check_translated(&translate_fragment(source)).map(|_| ())
}

/// Parses and validates a translated stage with naga.
pub(crate) fn check_translated(shader: &TranslatedShader) -> Result<naga::Module, String> {
    let stage = match shader.stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let module = Frontend::default()
        .parse(&Options::from(stage), &shader.source)
        .map_err(|errors| format_parse_errors(shader, &errors))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|err| {
            // Spans run from the enclosing function inwards; the last one that
            // lands in user code is the failing statement or expression.
            let spans: Vec<naga::Span> = err.spans().map(|(span, _)| *span).collect();
            let line = spans
                .iter()
                .rev()
                .filter(|span| span.is_defined())
                .find_map(|span| shader.user_line(span.location(&shader.source).line_number));
            let inner = err.as_inner();
            let mut message = inner.to_string();
            let mut source = inner.source();
            while let Some(cause) = source {
                let _ = write!(message, ": {cause}");
                source = cause.source();
            }
            log_line(line, &message)
        })?;

    Ok(module)
}

fn format_parse_errors(shader: &TranslatedShader, errors: &ParseErrors) -> String {
    let mut log = String::new();
    for error in &errors.errors {
        let location = error.meta.location(&shader.source);
        let translated_line = if expects_terminator(&error.kind) {
            preceding_token_line(&shader.source, location.offset as usize)
        } else {
            location.line_number
        };
        let line = shader.user_line(translated_line);
        log.push_str(&log_line(line, &error.kind.to_string()));
    }
    if log.is_empty() {
        log.push_str("ERROR: shader failed to parse\n");
    }
    log
}

/// A missing `;` is only noticed at the next token, which usually sits on a
/// later line than the statement it ends.
fn expects_terminator(kind: &ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::InvalidToken(_, expected)
            if expected.contains(&ExpectedToken::Token(TokenValue::Semicolon))
    )
}

/// 1-based line of the last token before `offset`, skipping blank lines and
/// whole-line `//` comments.
fn preceding_token_line(source: &str, offset: usize) -> u32 {
    let mut prefix = source.get(..offset).unwrap_or(source);
    loop {
        prefix = prefix.trim_end();
        let line_start = prefix.rfind('\n').map_or(0, |index| index + 1);
        if line_start > 0 && prefix[line_start..].trim_start().starts_with("//") {
            prefix = &prefix[..line_start];
            continue;
        }
        break;
    }
    prefix.matches('\n').count() as u32 + 1
}

fn log_line(line: Option<u32>, message: &str) -> String {
    match line {
        Some(line) => format!("ERROR: 0:{line}: {message}\n"),
        None => format!("ERROR: {message}\n"),
    }
}
