//! Handle-based GPU interface the engine renders through.
//!
//! The engine never talks to `wgpu` directly. Everything it needs from a GPU is
//! expressed by [`RenderBackend`]: opaque handles for shaders, programs,
//! buffers and textures, plus the handful of per-draw calls the render loop
//! issues. [`crate::gpu::WgpuBackend`] is the production implementation; tests
//! drive the engine with a recording fake.

use std::fmt;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wraps a backend-issued identifier.
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Returns the backend-issued identifier.
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

gpu_handle!(
    /// A single compiled (or compiling) shader stage.
    ShaderHandle
);
gpu_handle!(
    /// A linked vertex + fragment program.
    ProgramHandle
);
gpu_handle!(
    /// A vertex buffer.
    BufferHandle
);
gpu_handle!(
    /// A 2D RGBA texture.
    TextureHandle
);

/// Location of a uniform inside a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Pipeline stage a shader object belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Values the render loop writes into program uniforms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    /// Texture unit index for sampler uniforms.
    Int(i32),
}

/// Physical pixel size of a render surface or container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A decoded RGBA8 frame, rows stored top to bottom.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl DecodedFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Per-call pixel store settings for texture uploads.
///
/// Backends must apply these on every upload; nothing carries over from a
/// previous call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadOptions {
    /// Flip rows so image space and shader UV space agree.
    pub flip_y: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { flip_y: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("no GPU context available: {0}")]
    ContextUnavailable(String),
    #[error("failed to allocate {resource}: {reason}")]
    OutOfMemory {
        resource: &'static str,
        reason: String,
    },
    #[error("surface unavailable for this frame: {0}")]
    SurfaceUnavailable(String),
    #[error("unknown {0}")]
    UnknownHandle(String),
}

/// GPU operations required by the live rendering engine.
///
/// Compile and link report failures as the driver's info log so callers can run
/// it through [`crate::diagnostics`]. Every `create_*` must be matched by the
/// corresponding `delete_*`; deleting an unknown handle is a no-op.
pub trait RenderBackend {
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderHandle, BackendError>;
    /// Compiles `source` into `shader`, returning the info log on failure.
    fn compile_shader(&mut self, shader: ShaderHandle, source: &str) -> Result<(), String>;
    fn delete_shader(&mut self, shader: ShaderHandle);

    fn create_program(&mut self) -> Result<ProgramHandle, BackendError>;
    /// Links both stages into `program`, returning the info log on failure.
    fn link_program(
        &mut self,
        program: ProgramHandle,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<(), String>;
    fn delete_program(&mut self, program: ProgramHandle);

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;
    /// Returns `None` when the program does not declare `name`.
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    fn create_buffer(&mut self, vertices: &[f32]) -> Result<BufferHandle, BackendError>;
    fn delete_buffer(&mut self, buffer: BufferHandle);
    fn bind_vertex_attribute(
        &mut self,
        program: ProgramHandle,
        buffer: BufferHandle,
        location: u32,
        components: u32,
    );

    fn create_texture(&mut self) -> Result<TextureHandle, BackendError>;
    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        frame: &DecodedFrame,
        options: UploadOptions,
    ) -> Result<(), BackendError>;
    fn delete_texture(&mut self, texture: TextureHandle);

    /// Resizes the render surface and sets the viewport to cover it.
    fn resize_surface(&mut self, size: SurfaceSize);
    fn use_program(&mut self, program: ProgramHandle);
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);
    /// Binds `texture` to `unit`; `None` leaves the unit empty.
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);
    /// Draws `count` vertices as a triangle strip and presents the result.
    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), BackendError>;
}
