//! Ownership of every GPU handle the engine allocates.
//!
//! The manager is the only component that creates or deletes backend objects.
//! It holds no backend reference itself; each call borrows the backend so the
//! engine can keep a single owner for it.

use std::collections::HashMap;

use crate::backend::{
    BackendError, BufferHandle, ProgramHandle, RenderBackend, ShaderHandle, ShaderStage,
    TextureHandle,
};

/// Two triangles covering clip space, drawn as a triangle strip.
pub const QUAD_VERTICES: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
/// Vertex count of [`QUAD_VERTICES`].
pub const QUAD_VERTEX_COUNT: u32 = 4;

/// Identifies the media reference a texture belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureKey(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("resource exhaustion while creating {what}: {source}")]
pub struct ResourceError {
    pub what: &'static str,
    #[source]
    pub source: BackendError,
}

impl ResourceError {
    fn new(what: &'static str, source: BackendError) -> Self {
        Self { what, source }
    }
}

/// Live handle counts, used to check that nothing leaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub programs: usize,
    pub shaders: usize,
    pub textures: usize,
    pub buffers: usize,
}

impl ResourceCounts {
    pub fn total(&self) -> usize {
        self.programs + self.shaders + self.textures + self.buffers
    }
}

#[derive(Debug, Default)]
pub struct ResourceManager {
    active_program: Option<ProgramHandle>,
    /// Passthrough program drawn while the unprocessed media is shown.
    original_program: Option<ProgramHandle>,
    /// Programs created for a link attempt that has not finished yet.
    staged_programs: Vec<ProgramHandle>,
    shaders: Vec<ShaderHandle>,
    geometry: Option<BufferHandle>,
    textures: HashMap<TextureKey, TextureHandle>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_program(&self) -> Option<ProgramHandle> {
        self.active_program
    }

    pub fn original_program(&self) -> Option<ProgramHandle> {
        self.original_program
    }

    pub fn geometry(&self) -> Option<BufferHandle> {
        self.geometry
    }

    pub fn texture(&self, key: TextureKey) -> Option<TextureHandle> {
        self.textures.get(&key).copied()
    }

    pub fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            programs: self.staged_programs.len()
                + usize::from(self.active_program.is_some())
                + usize::from(self.original_program.is_some()),
            shaders: self.shaders.len(),
            textures: self.textures.len(),
            buffers: usize::from(self.geometry.is_some()),
        }
    }

    pub fn create_shader<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        stage: ShaderStage,
    ) -> Result<ShaderHandle, ResourceError> {
        let shader = backend
            .create_shader(stage)
            .map_err(|err| ResourceError::new("shader", err))?;
        self.shaders.push(shader);
        Ok(shader)
    }

    pub fn dispose_shader<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        shader: ShaderHandle,
    ) {
        if let Some(index) = self.shaders.iter().position(|owned| *owned == shader) {
            self.shaders.swap_remove(index);
            backend.delete_shader(shader);
        }
    }

    /// Allocates a program that is not yet visible to the render loop.
    pub fn create_program<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<ProgramHandle, ResourceError> {
        let program = backend
            .create_program()
            .map_err(|err| ResourceError::new("program", err))?;
        self.staged_programs.push(program);
        Ok(program)
    }

    /// Deletes a staged program whose link failed.
    pub fn discard_program<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        program: ProgramHandle,
    ) {
        if let Some(index) = self.staged_programs.iter().position(|p| *p == program) {
            self.staged_programs.swap_remove(index);
            backend.delete_program(program);
        }
    }

    /// Installs `program` as the active program and deletes the previous one.
    ///
    /// The new program is in place before the old one is released, so a frame
    /// never observes "no program".
    pub fn replace_program<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        program: ProgramHandle,
    ) {
        self.staged_programs.retain(|staged| *staged != program);
        let previous = self.active_program.replace(program);
        if let Some(previous) = previous.filter(|previous| *previous != program) {
            backend.delete_program(previous);
            tracing::debug!(%previous, %program, "replaced active program");
        }
    }

    /// Installs the passthrough program, deleting any previous one.
    pub fn install_original_program<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        program: ProgramHandle,
    ) {
        self.staged_programs.retain(|staged| *staged != program);
        if let Some(previous) = self.original_program.replace(program) {
            if previous != program {
                backend.delete_program(previous);
            }
        }
    }

    /// Returns the full-surface quad buffer, creating it on first use.
    pub fn ensure_geometry<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<BufferHandle, ResourceError> {
        if let Some(buffer) = self.geometry {
            return Ok(buffer);
        }
        let buffer = backend
            .create_buffer(&QUAD_VERTICES)
            .map_err(|err| ResourceError::new("geometry buffer", err))?;
        self.geometry = Some(buffer);
        Ok(buffer)
    }

    /// Allocates a texture for `key`, releasing any texture it already had.
    pub fn create_texture<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: TextureKey,
    ) -> Result<TextureHandle, ResourceError> {
        let texture = backend
            .create_texture()
            .map_err(|err| ResourceError::new("texture", err))?;
        self.replace_texture(backend, key, texture);
        Ok(texture)
    }

    /// Associates `texture` with `key` and deletes the texture it replaces.
    pub fn replace_texture<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: TextureKey,
        texture: TextureHandle,
    ) {
        if let Some(previous) = self.textures.insert(key, texture) {
            if previous != texture {
                backend.delete_texture(previous);
            }
        }
    }

    pub fn dispose_texture<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: TextureKey,
    ) {
        if let Some(texture) = self.textures.remove(&key) {
            backend.delete_texture(texture);
        }
    }

    /// Releases every outstanding handle.
    pub fn dispose_all<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        let counts = self.counts();
        for shader in self.shaders.drain(..) {
            backend.delete_shader(shader);
        }
        for program in self.staged_programs.drain(..) {
            backend.delete_program(program);
        }
        if let Some(program) = self.active_program.take() {
            backend.delete_program(program);
        }
        if let Some(program) = self.original_program.take() {
            backend.delete_program(program);
        }
        for (_, texture) in self.textures.drain() {
            backend.delete_texture(texture);
        }
        if let Some(buffer) = self.geometry.take() {
            backend.delete_buffer(buffer);
        }
        if counts.total() > 0 {
            tracing::debug!(
                programs = counts.programs,
                shaders = counts.shaders,
                textures = counts.textures,
                buffers = counts.buffers,
                "released GPU resources"
            );
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        let counts = self.counts();
        if counts.total() > 0 {
            tracing::warn!(
                programs = counts.programs,
                shaders = counts.shaders,
                textures = counts.textures,
                buffers = counts.buffers,
                "resource manager dropped with live GPU handles"
            );
        }
    }
}
