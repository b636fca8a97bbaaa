use std::fmt;

use crate::backend::{ProgramHandle, RenderBackend, ShaderHandle, ShaderStage};
use crate::diagnostics::{parse_link_log, parse_log, Diagnostic};
use crate::resources::{ResourceError, ResourceManager};

/// Pass-through vertex stage shared by every program.
pub const VERTEX_SHADER_SOURCE: &str = "attribute vec2 a_position;
void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Draws the bound media unprocessed, for comparing against the user program.
pub const ORIGINAL_FRAGMENT_SOURCE: &str = "precision mediump float;
uniform vec2 u_resolution;
uniform sampler2D u_texture;
void main() {
    gl_FragColor = texture2D(u_texture, gl_FragCoord.xy / u_resolution);
}
";

/// Attribute fed from the full-surface quad buffer.
pub const POSITION_ATTRIBUTE: &str = "a_position";
const POSITION_COMPONENTS: u32 = 2;

/// Step of the pipeline a failure came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailedStage {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedStage::Vertex => f.write_str("vertex shader"),
            FailedStage::Fragment => f.write_str("fragment shader"),
            FailedStage::Link => f.write_str("program link"),
        }
    }
}

/// Outcome of one compile attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompilationResult {
    Linked {
        program: ProgramHandle,
    },
    Failed {
        stage: FailedStage,
        message: String,
        line: Option<u32>,
    },
}

impl CompilationResult {
    pub fn is_linked(&self) -> bool {
        matches!(self, CompilationResult::Linked { .. })
    }

    pub fn program(&self) -> Option<ProgramHandle> {
        match self {
            CompilationResult::Linked { program } => Some(*program),
            CompilationResult::Failed { .. } => None,
        }
    }

    pub fn diagnostic(&self) -> Option<Diagnostic> {
        match self {
            CompilationResult::Linked { .. } => None,
            CompilationResult::Failed { message, line, .. } => {
                Some(Diagnostic::new(message.clone(), *line))
            }
        }
    }

    fn failed(stage: FailedStage, diagnostic: Diagnostic) -> Self {
        CompilationResult::Failed {
            stage,
            message: diagnostic.message,
            line: diagnostic.line,
        }
    }
}

/// Where a freshly linked program is installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProgramSlot {
    Active,
    Original,
}

/// Compiles `fragment_source` against the fixed vertex stage and links them.
///
/// On success the new program replaces the active one and the quad geometry
/// is bound to it. On failure the active program is left untouched. Shader
/// objects never outlive the call.
pub fn compile_program<B: RenderBackend + ?Sized>(
    backend: &mut B,
    resources: &mut ResourceManager,
    fragment_source: &str,
) -> Result<CompilationResult, ResourceError> {
    compile_into(backend, resources, fragment_source, ProgramSlot::Active)
}

/// Links [`ORIGINAL_FRAGMENT_SOURCE`] once and keeps it next to the active
/// program. Later calls return the existing program.
pub fn compile_original<B: RenderBackend + ?Sized>(
    backend: &mut B,
    resources: &mut ResourceManager,
) -> Result<CompilationResult, ResourceError> {
    if let Some(program) = resources.original_program() {
        return Ok(CompilationResult::Linked { program });
    }
    compile_into(
        backend,
        resources,
        ORIGINAL_FRAGMENT_SOURCE,
        ProgramSlot::Original,
    )
}

fn compile_into<B: RenderBackend + ?Sized>(
    backend: &mut B,
    resources: &mut ResourceManager,
    fragment_source: &str,
    slot: ProgramSlot,
) -> Result<CompilationResult, ResourceError> {
    let vertex = resources.create_shader(backend, ShaderStage::Vertex)?;
    let fragment = match resources.create_shader(backend, ShaderStage::Fragment) {
        Ok(fragment) => fragment,
        Err(err) => {
            resources.dispose_shader(backend, vertex);
            return Err(err);
        }
    };

    let result = build_program(backend, resources, vertex, fragment, fragment_source, slot);

    resources.dispose_shader(backend, vertex);
    resources.dispose_shader(backend, fragment);
    result
}

fn build_program<B: RenderBackend + ?Sized>(
    backend: &mut B,
    resources: &mut ResourceManager,
    vertex: ShaderHandle,
    fragment: ShaderHandle,
    fragment_source: &str,
    slot: ProgramSlot,
) -> Result<CompilationResult, ResourceError> {
    if let Err(log) = backend.compile_shader(vertex, VERTEX_SHADER_SOURCE) {
        tracing::error!(%log, "built-in vertex shader failed to compile");
        let diagnostic = parse_log(&log);
        return Ok(CompilationResult::Failed {
            stage: FailedStage::Vertex,
            message: format!("vertex shader error: {}", diagnostic.message),
            line: diagnostic.line,
        });
    }

    if let Err(log) = backend.compile_shader(fragment, fragment_source) {
        let diagnostic = parse_log(&log);
        tracing::debug!(line = ?diagnostic.line, "fragment shader failed to compile");
        return Ok(CompilationResult::failed(FailedStage::Fragment, diagnostic));
    }

    let program = resources.create_program(backend)?;
    if let Err(log) = backend.link_program(program, vertex, fragment) {
        resources.discard_program(backend, program);
        tracing::debug!("program failed to link");
        return Ok(CompilationResult::failed(
            FailedStage::Link,
            parse_link_log(&log),
        ));
    }

    match slot {
        ProgramSlot::Active => resources.replace_program(backend, program),
        ProgramSlot::Original => resources.install_original_program(backend, program),
    }
    let geometry = resources.ensure_geometry(backend)?;
    match backend.attrib_location(program, POSITION_ATTRIBUTE) {
        Some(location) => {
            backend.bind_vertex_attribute(program, geometry, location, POSITION_COMPONENTS)
        }
        None => tracing::warn!(%program, "linked program has no position attribute"),
    }

    tracing::debug!(%program, "program linked");
    Ok(CompilationResult::Linked { program })
}
