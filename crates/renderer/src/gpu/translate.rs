//! Rewrites WebGL-style GLSL (ES 1.00) into the Vulkan-flavoured GLSL 450 the
//! naga front end accepts.
//!
//! The rewrite works line by line and never removes or inserts a line inside
//! the user's code: directives and recognised uniform declarations are blanked
//! in place, WebGL names are replaced token by token on their own line, and
//! everything we need is declared in a header. Every token therefore keeps its
//! line, and a compiler line number maps back to the user's line by
//! subtracting the header length.

use std::borrow::Cow;

use crate::backend::ShaderStage;
use crate::scheduler::{MOUSE_UNIFORM, RESOLUTION_UNIFORM, TEXTURE_UNIFORM, TIME_UNIFORM};

use super::uniforms::UniformSlot;

/// Uniforms the user's source declared and therefore expects to be fed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeclaredUniforms {
    pub resolution: bool,
    pub time: bool,
    pub mouse: bool,
    pub texture: bool,
}

impl DeclaredUniforms {
    /// Uniform slot for `name`, when the source declared it.
    pub fn slot(&self, name: &str) -> Option<UniformSlot> {
        let (declared, slot) = match name {
            RESOLUTION_UNIFORM => (self.resolution, UniformSlot::Resolution),
            TIME_UNIFORM => (self.time, UniformSlot::Time),
            MOUSE_UNIFORM => (self.mouse, UniformSlot::Mouse),
            TEXTURE_UNIFORM => (self.texture, UniformSlot::Texture),
            _ => return None,
        };
        declared.then_some(slot)
    }

    fn collect(source: &str) -> Self {
        let mut uniforms = Self::default();
        for line in source.lines() {
            let Some((name, ty)) = uniform_declaration(line) else {
                continue;
            };
            match (name, ty) {
                (RESOLUTION_UNIFORM, "vec2") => uniforms.resolution = true,
                (TIME_UNIFORM, "float") => uniforms.time = true,
                (MOUSE_UNIFORM, "vec2") => uniforms.mouse = true,
                (TEXTURE_UNIFORM, "sampler2D") => uniforms.texture = true,
                _ => {}
            }
        }
        uniforms
    }

    /// True when `name` is a declared uniform fed from the frame block.
    fn feeds(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }
}

/// A stage rewritten for naga, with the bookkeeping to map errors back.
#[derive(Clone, Debug)]
pub struct TranslatedShader {
    pub stage: ShaderStage,
    pub source: String,
    pub header_lines: u32,
    pub user_lines: u32,
    pub uniforms: DeclaredUniforms,
    /// Vertex inputs in location order.
    pub attributes: Vec<String>,
}

impl TranslatedShader {
    /// Maps a 1-based line of the translated source back to the user's source.
    pub fn user_line(&self, translated_line: u32) -> Option<u32> {
        translated_line
            .checked_sub(self.header_lines)
            .filter(|line| (1..=self.user_lines).contains(line))
    }
}

const FRAGMENT_PRELUDE: &str = r"#version 450
layout(std140, set = 0, binding = 0) uniform PreviewFrame {
    vec2 resolution;
    vec2 mouse;
    vec2 origin;
    float time;
} preview_frame;
layout(set = 1, binding = 0) uniform texture2D preview_texture;
layout(set = 1, binding = 1) uniform sampler preview_sampler;
layout(location = 0) out vec4 preview_color;
vec4 preview_frag_coord;
";

/// Calls the user's entry point after remapping `gl_FragCoord` to the render
/// surface with a bottom-left origin.
const FRAGMENT_EPILOGUE: &str = r"void main() {
    preview_frag_coord = vec4(
        gl_FragCoord.x - preview_frame.origin.x,
        preview_frame.resolution.y - (gl_FragCoord.y - preview_frame.origin.y),
        gl_FragCoord.z,
        gl_FragCoord.w);
    preview_user_main();
}
";

/// WebGL names and what they become in the translated fragment stage.
const FRAGMENT_RENAMES: [(&str, &str); 4] = [
    ("gl_FragColor", "preview_color"),
    ("gl_FragCoord", "preview_frag_coord"),
    ("main", "preview_user_main"),
    ("texture2D", "texture"),
];

const VERTEX_PRELUDE: &str = "#version 450\n";

pub fn translate_fragment(source: &str) -> TranslatedShader {
    let uniforms = DeclaredUniforms::collect(source);
    let mut attributes = Vec::new();
    let body = rewrite_lines(source, ShaderStage::Fragment, &uniforms, &mut attributes);
    assemble(
        ShaderStage::Fragment,
        FRAGMENT_PRELUDE.to_string(),
        body,
        FRAGMENT_EPILOGUE,
        uniforms,
        attributes,
    )
}

pub fn translate_vertex(source: &str) -> TranslatedShader {
    let uniforms = DeclaredUniforms::default();
    let mut attributes = Vec::new();
    let body = rewrite_lines(source, ShaderStage::Vertex, &uniforms, &mut attributes);
    assemble(
        ShaderStage::Vertex,
        VERTEX_PRELUDE.to_string(),
        body,
        "",
        uniforms,
        attributes,
    )
}

fn assemble(
    stage: ShaderStage,
    header: String,
    body: Vec<Cow<'_, str>>,
    footer: &str,
    uniforms: DeclaredUniforms,
    attributes: Vec<String>,
) -> TranslatedShader {
    let header_lines = header.lines().count() as u32;
    let user_lines = body.len() as u32;
    let mut source = header;
    for line in &body {
        source.push_str(line);
        source.push('\n');
    }
    source.push_str(footer);

    TranslatedShader {
        stage,
        source,
        header_lines,
        user_lines,
        uniforms,
        attributes,
    }
}

fn rewrite_lines<'a>(
    source: &'a str,
    stage: ShaderStage,
    uniforms: &DeclaredUniforms,
    attributes: &mut Vec<String>,
) -> Vec<Cow<'a, str>> {
    let mut varyings = 0u32;
    source
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let indent = &line[..line.len() - trimmed.len()];

            if trimmed.starts_with("#version") || trimmed.starts_with("precision ") {
                return Cow::Borrowed("");
            }
            if let Some((name, _)) = uniform_declaration(line) {
                if uniforms.feeds(name) {
                    return Cow::Borrowed("");
                }
                return Cow::Borrowed(line);
            }
            if let Some(rest) = trimmed.strip_prefix("varying ") {
                let direction = match stage {
                    ShaderStage::Vertex => "out",
                    ShaderStage::Fragment => "in",
                };
                let location = varyings;
                varyings += 1;
                return Cow::Owned(format!(
                    "{indent}layout(location = {location}) {direction} {rest}"
                ));
            }
            match stage {
                ShaderStage::Vertex => {
                    if let Some(rest) = trimmed.strip_prefix("attribute ") {
                        let location = attributes.len();
                        if let Some((name, _)) = declared_name(rest) {
                            attributes.push(name.to_string());
                        }
                        return Cow::Owned(format!(
                            "{indent}layout(location = {location}) in {rest}"
                        ));
                    }
                    Cow::Borrowed(line)
                }
                ShaderStage::Fragment => rename_identifiers(line, |name| {
                    FRAGMENT_RENAMES
                        .iter()
                        .find(|(from, _)| *from == name)
                        .map(|(_, to)| *to)
                        .or_else(|| uniform_replacement(uniforms, name))
                }),
            }
        })
        .collect()
}

fn uniform_replacement(uniforms: &DeclaredUniforms, name: &str) -> Option<&'static str> {
    match uniforms.slot(name)? {
        UniformSlot::Resolution => Some("preview_frame.resolution"),
        UniformSlot::Time => Some("preview_frame.time"),
        UniformSlot::Mouse => Some("preview_frame.mouse"),
        UniformSlot::Texture => Some("sampler2D(preview_texture, preview_sampler)"),
    }
}

/// Replaces whole identifier tokens on one line, leaving `//` comments,
/// numeric literals and member names after `.` alone.
fn rename_identifiers<'a, F>(line: &'a str, rename: F) -> Cow<'a, str>
where
    F: Fn(&str) -> Option<&'static str>,
{
    let code_end = line.find("//").unwrap_or(line.len());
    let bytes = line.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut index = 0;

    while index < code_end {
        let byte = bytes[index];
        if byte.is_ascii_digit() {
            while index < code_end && (is_word_byte(bytes[index]) || bytes[index] == b'.') {
                index += 1;
            }
            continue;
        }
        if !(byte.is_ascii_alphabetic() || byte == b'_') {
            index += 1;
            continue;
        }

        let start = index;
        while index < code_end && is_word_byte(bytes[index]) {
            index += 1;
        }
        let is_member = line[..start].trim_end().ends_with('.');
        if is_member {
            continue;
        }
        if let Some(replacement) = rename(&line[start..index]) {
            let out = out.get_or_insert_with(|| String::with_capacity(line.len() + 16));
            out.push_str(&line[copied..start]);
            out.push_str(replacement);
            copied = index;
        }
    }

    match out {
        Some(mut out) => {
            out.push_str(&line[copied..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(line),
    }
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// `(name, type)` of a `uniform [precision] type name;` line.
fn uniform_declaration(line: &str) -> Option<(&str, &str)> {
    declared_name(line.trim_start().strip_prefix("uniform ")?)
}

/// Splits `[qualifiers] type name;` into `(name, type)`.
fn declared_name(declaration: &str) -> Option<(&str, &str)> {
    let (declaration, _) = declaration.split_once(';')?;
    let mut tokens = declaration.split_whitespace().rev();
    let name = tokens.next()?;
    let ty = tokens.next()?;
    Some((name, ty))
}
