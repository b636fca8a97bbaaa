//! Renderer crate for instantglsl, a live GLSL fragment preview.
//!
//! The crate turns fragment source text into pixels and keeps doing so while
//! the source, the bound media and the window change underneath it:
//!
//! ```text
//!   editor / instantglsl
//!          │ compile(source), set_media(reference), pause/resume
//!          ▼
//!   LiveRenderer ──▶ compile_program ──▶ ResourceManager ──▶ RenderBackend
//!          │                                   ▲
//!          ├─▶ MediaPipeline ──(decoded frames)┘
//!          └─▶ RenderLoop ──▶ uniforms + draw_arrays per paint
//! ```
//!
//! [`LiveRenderer`] is generic over a [`RenderBackend`] (the GPU) and a
//! [`DisplayHost`] (the window), so everything except the wgpu and winit
//! glue in [`gpu`] and [`window`] can be driven headless. Compile failures
//! surface as [`Diagnostic`]s while the last good program keeps rendering.

pub mod backend;
pub mod compile;
pub mod diagnostics;
pub mod engine;
pub mod gpu;
pub mod media;
pub mod resources;
pub mod runtime;
pub mod scheduler;
pub mod sizing;
pub mod window;

pub use backend::{
    BackendError, DecodedFrame, RenderBackend, ShaderStage, SurfaceSize, UniformLocation,
    UniformValue, UploadOptions,
};
pub use compile::{compile_program, CompilationResult, FailedStage, VERTEX_SHADER_SOURCE};
pub use diagnostics::{parse_link_log, parse_log, Diagnostic};
pub use engine::{DiagnosticsListener, EngineError, EngineOptions, LiveRenderer};
pub use gpu::{validate_fragment, WgpuBackend};
pub use media::{DecoderLoader, DecoderOptions, MediaKind, MediaReference, MediaState};
pub use resources::{ResourceCounts, ResourceError, ResourceManager};
pub use runtime::{ResumeMode, SystemTimeSource, TimeSource};
pub use scheduler::{DisplayHost, FrameRequest, FrameTask, LoopState};
pub use sizing::{SurfaceGeometry, Viewport};
pub use window::{PreviewEvent, PreviewOptions, PreviewWindow, WindowHost};
