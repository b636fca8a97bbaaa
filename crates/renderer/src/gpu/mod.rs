//! wgpu implementation of [`crate::backend::RenderBackend`].
//!
//! - `context` owns the wgpu instance, device and swapchain, and rebuilds the
//!   swapchain when the window resizes.
//! - `translate` rewrites WebGL-style fragment programs into GLSL 450 without
//!   moving any user line, so compiler line numbers stay meaningful.
//! - `validate` runs naga over the translated source and formats failures as
//!   driver-style logs; it also backs the headless `check` command.
//! - `uniforms` mirrors the injected `PreviewFrame` block.
//! - `state` maps handles onto wgpu objects and records one render pass per
//!   draw.

mod context;
mod state;
mod translate;
mod uniforms;
mod validate;

pub use state::WgpuBackend;
pub use translate::{translate_fragment, translate_vertex, DeclaredUniforms, TranslatedShader};
pub use uniforms::UniformSlot;
pub use validate::validate_fragment;
