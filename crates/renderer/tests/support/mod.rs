#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use renderer::backend::{BufferHandle, ProgramHandle, ShaderHandle, TextureHandle};
use renderer::media::{FramePoll, FrameSource, MediaLoader};
use renderer::runtime::ManualTimeSource;
use renderer::{
    BackendError, DecodedFrame, DisplayHost, EngineOptions, FrameRequest, FrameTask,
    LiveRenderer, MediaReference, RenderBackend, ShaderStage, SurfaceSize, UniformLocation,
    UniformValue, UploadOptions,
};

const KNOWN_UNIFORMS: [&str; 4] = ["u_resolution", "u_time", "u_mouse", "u_texture"];

pub const GRADIENT: &str = "precision mediump float;
uniform vec2 u_resolution;
uniform float u_time;
void main() {
    vec2 uv = gl_FragCoord.xy / u_resolution;
    gl_FragColor = vec4(uv, 0.5 + 0.5 * sin(u_time), 1.0);
}
";

pub const TEXTURED: &str = "precision mediump float;
uniform vec2 u_resolution;
uniform float u_time;
uniform vec2 u_mouse;
uniform sampler2D u_texture;
void main() {
    vec2 uv = gl_FragCoord.xy / u_resolution;
    gl_FragColor = texture2D(u_texture, uv);
}
";

#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub surface: Option<SurfaceSize>,
    pub uniforms: Vec<(String, UniformValue)>,
    pub texture: Option<TextureHandle>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub texture: TextureHandle,
    pub size: (u32, u32),
    pub flip_y: bool,
}

/// Backend that keeps every handle in memory and records what was drawn.
///
/// Fragment sources fail to compile when a line containing `=` does not end
/// in `;`, and fail to link when they use `varying`.
#[derive(Default)]
pub struct RecordingBackend {
    next: u32,
    shaders: HashMap<u32, (ShaderStage, String)>,
    programs: HashMap<u32, Vec<String>>,
    buffers: HashSet<u32>,
    textures: HashSet<u32>,
    current_program: Option<ProgramHandle>,
    bound_texture: Option<TextureHandle>,
    pending_uniforms: Vec<(String, UniformValue)>,
    surface: Option<SurfaceSize>,
    pub draws: Vec<DrawCall>,
    pub uploads: Vec<Upload>,
    pub resizes: Vec<SurfaceSize>,
    pub double_frees: Vec<String>,
    pub fail_texture_allocation: bool,
    pub lose_surface_frames: u32,
    pub lose_context: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_total(&self) -> usize {
        self.live_programs() + self.live_shaders() + self.live_buffers() + self.live_textures()
    }

    pub fn last_draw(&self) -> Option<&DrawCall> {
        self.draws.last()
    }

    fn allocate(&mut self) -> u32 {
        self.next += 1;
        self.next
    }
}

fn syntax_error(source: &str) -> Option<String> {
    source.lines().enumerate().find_map(|(index, line)| {
        let trimmed = line.trim();
        let is_statement = trimmed.contains('=') && !trimmed.starts_with("//");
        (is_statement && !trimmed.ends_with(';'))
            .then(|| format!("ERROR: 0:{}: syntax error, unexpected end of statement\n", index + 1))
    })
}

impl RenderBackend for RecordingBackend {
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderHandle, BackendError> {
        let id = self.allocate();
        self.shaders.insert(id, (stage, String::new()));
        Ok(ShaderHandle::from_raw(id))
    }

    fn compile_shader(&mut self, shader: ShaderHandle, source: &str) -> Result<(), String> {
        let Some(entry) = self.shaders.get_mut(&shader.raw()) else {
            return Err(format!("ERROR: unknown {shader}\n"));
        };
        entry.1 = source.to_string();
        match syntax_error(source) {
            Some(log) => Err(log),
            None => Ok(()),
        }
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        if self.shaders.remove(&shader.raw()).is_none() {
            self.double_frees.push(shader.to_string());
        }
    }

    fn create_program(&mut self) -> Result<ProgramHandle, BackendError> {
        let id = self.allocate();
        self.programs.insert(id, Vec::new());
        Ok(ProgramHandle::from_raw(id))
    }

    fn link_program(
        &mut self,
        program: ProgramHandle,
        _vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<(), String> {
        let source = self
            .shaders
            .get(&fragment.raw())
            .map(|(_, source)| source.clone())
            .unwrap_or_default();
        if source.contains("varying") {
            return Err("ERROR: Linking failed: varying v_uv has no matching output\n".into());
        }
        let uniforms = KNOWN_UNIFORMS
            .iter()
            .filter(|name| source.contains(*name))
            .map(|name| name.to_string())
            .collect();
        self.programs.insert(program.raw(), uniforms);
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program.raw()).is_none() {
            self.double_frees.push(program.to_string());
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        (self.programs.contains_key(&program.raw()) && name == "a_position").then_some(0)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let uniforms = self.programs.get(&program.raw())?;
        uniforms
            .iter()
            .position(|declared| declared == name)
            .map(|index| UniformLocation(index as u32))
    }

    fn create_buffer(&mut self, _vertices: &[f32]) -> Result<BufferHandle, BackendError> {
        let id = self.allocate();
        self.buffers.insert(id);
        Ok(BufferHandle::from_raw(id))
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if !self.buffers.remove(&buffer.raw()) {
            self.double_frees.push(buffer.to_string());
        }
    }

    fn bind_vertex_attribute(
        &mut self,
        _program: ProgramHandle,
        _buffer: BufferHandle,
        _location: u32,
        _components: u32,
    ) {
    }

    fn create_texture(&mut self) -> Result<TextureHandle, BackendError> {
        if self.fail_texture_allocation {
            return Err(BackendError::OutOfMemory {
                resource: "texture",
                reason: "video memory exhausted".into(),
            });
        }
        let id = self.allocate();
        self.textures.insert(id);
        Ok(TextureHandle::from_raw(id))
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        frame: &DecodedFrame,
        options: UploadOptions,
    ) -> Result<(), BackendError> {
        if !self.textures.contains(&texture.raw()) {
            return Err(BackendError::UnknownHandle(texture.to_string()));
        }
        self.uploads.push(Upload {
            texture,
            size: frame.dimensions(),
            flip_y: options.flip_y,
        });
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if !self.textures.remove(&texture.raw()) {
            self.double_frees.push(texture.to_string());
        }
        if self.bound_texture == Some(texture) {
            self.bound_texture = None;
        }
    }

    fn resize_surface(&mut self, size: SurfaceSize) {
        self.surface = Some(size);
        self.resizes.push(size);
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
        self.pending_uniforms.clear();
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self.current_program else {
            return;
        };
        let name = self
            .programs
            .get(&program.raw())
            .and_then(|uniforms| uniforms.get(location.0 as usize))
            .cloned()
            .unwrap_or_else(|| format!("#{}", location.0));
        self.pending_uniforms.push((name, value));
    }

    fn bind_texture(&mut self, _unit: u32, texture: Option<TextureHandle>) {
        self.bound_texture = texture;
    }

    fn draw_arrays(&mut self, _first: u32, _count: u32) -> Result<(), BackendError> {
        if self.lose_context {
            return Err(BackendError::ContextUnavailable("device lost".into()));
        }
        if self.lose_surface_frames > 0 {
            self.lose_surface_frames -= 1;
            return Err(BackendError::SurfaceUnavailable("surface outdated".into()));
        }
        let Some(program) = self.current_program else {
            return Err(BackendError::UnknownHandle("no program in use".into()));
        };
        self.draws.push(DrawCall {
            program,
            surface: self.surface,
            uniforms: std::mem::take(&mut self.pending_uniforms),
            texture: self.bound_texture,
        });
        Ok(())
    }
}

impl DrawCall {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, value)| *value)
    }
}

/// Host whose paint opportunities are triggered by the test.
#[derive(Debug)]
pub struct ManualHost {
    next: u64,
    pending: Vec<(FrameRequest, FrameTask)>,
    pub cancelled: Vec<FrameRequest>,
    pub container: SurfaceSize,
}

impl ManualHost {
    pub fn new(container: SurfaceSize) -> Self {
        Self {
            next: 0,
            pending: Vec::new(),
            cancelled: Vec::new(),
            container,
        }
    }

    pub fn pending_tasks(&self) -> Vec<FrameTask> {
        self.pending.iter().map(|(_, task)| *task).collect()
    }

    pub fn pending_count(&self, task: FrameTask) -> usize {
        self.pending.iter().filter(|(_, pending)| *pending == task).count()
    }
}

impl DisplayHost for ManualHost {
    fn request_frame(&mut self, task: FrameTask) -> FrameRequest {
        self.next += 1;
        let request = FrameRequest(self.next);
        self.pending.push((request, task));
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        self.pending.retain(|(pending, _)| *pending != request);
        self.cancelled.push(request);
    }

    fn take_due(&mut self) -> Vec<FrameRequest> {
        self.pending.drain(..).map(|(request, _)| request).collect()
    }

    fn container_size(&self) -> SurfaceSize {
        self.container
    }
}

#[derive(Clone, Debug)]
pub enum Step {
    Pending,
    Frame(u32, u32),
    Fail(&'static str),
    End,
}

#[derive(Clone, Debug)]
pub struct Script {
    pub steps: Vec<Step>,
    /// Continuous scripts repeat their last frame once the steps run out.
    pub continuous: bool,
}

impl Script {
    pub fn still(width: u32, height: u32) -> Self {
        Self {
            steps: vec![Step::Pending, Step::Frame(width, height), Step::End],
            continuous: false,
        }
    }

    pub fn clip(width: u32, height: u32) -> Self {
        Self {
            steps: vec![Step::Frame(width, height)],
            continuous: true,
        }
    }

    pub fn failing(reason: &'static str) -> Self {
        Self {
            steps: vec![Step::Fail(reason)],
            continuous: false,
        }
    }
}

/// Loader that plays back per-path scripts and tracks open sources.
#[derive(Clone, Default)]
pub struct ScriptedLoader {
    scripts: Rc<RefCell<HashMap<PathBuf, Script>>>,
    pub opened: Rc<RefCell<Vec<PathBuf>>>,
    pub live_sources: Rc<Cell<usize>>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, path: impl Into<PathBuf>, script: Script) -> MediaReference {
        let path = path.into();
        self.scripts.borrow_mut().insert(path.clone(), script);
        MediaReference::from_path(path).expect("test media path has a known extension")
    }
}

impl MediaLoader for ScriptedLoader {
    fn open(&mut self, reference: &MediaReference) -> Box<dyn FrameSource> {
        self.opened.borrow_mut().push(reference.locator.clone());
        self.live_sources.set(self.live_sources.get() + 1);
        let script = self
            .scripts
            .borrow()
            .get(&reference.locator)
            .cloned()
            .unwrap_or_else(|| Script::failing("no such file"));
        Box::new(ScriptedSource {
            steps: script.steps.into_iter().collect(),
            continuous: script.continuous,
            last_frame: None,
            live: Rc::clone(&self.live_sources),
        })
    }
}

struct ScriptedSource {
    steps: VecDeque<Step>,
    continuous: bool,
    last_frame: Option<(u32, u32)>,
    live: Rc<Cell<usize>>,
}

impl FrameSource for ScriptedSource {
    fn poll_frame(&mut self) -> FramePoll {
        let step = match self.steps.pop_front() {
            Some(step) => step,
            None if self.continuous => match self.last_frame {
                Some((width, height)) => Step::Frame(width, height),
                None => Step::Pending,
            },
            None => Step::End,
        };
        match step {
            Step::Pending => FramePoll::Pending,
            Step::Frame(width, height) => {
                self.last_frame = Some((width, height));
                let data = vec![255; (width * height * 4) as usize];
                FramePoll::Frame(DecodedFrame::new(data, width, height))
            }
            Step::Fail(reason) => FramePoll::Failed(reason.to_string()),
            Step::End => FramePoll::Ended,
        }
    }

    fn is_continuous(&self) -> bool {
        self.continuous
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

pub type TestRenderer = LiveRenderer<RecordingBackend, ManualHost>;

pub struct Harness {
    pub engine: TestRenderer,
    pub clock: ManualTimeSource,
    pub loader: ScriptedLoader,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let clock = ManualTimeSource::new();
        let loader = ScriptedLoader::new();
        let engine = LiveRenderer::with_time_source(
            RecordingBackend::new(),
            ManualHost::new(SurfaceSize::new(800, 600)),
            Box::new(loader.clone()),
            options,
            Box::new(clock.clone()),
        );
        Self {
            engine,
            clock,
            loader,
        }
    }

    pub fn backend(&self) -> &RecordingBackend {
        self.engine.backend()
    }

    /// Advances the clock by one 60 Hz frame and runs the due callbacks.
    pub fn paint(&mut self) {
        self.clock.advance(Duration::from_millis(16));
        self.engine.on_paint().expect("paint succeeds");
    }

    pub fn paint_n(&mut self, frames: usize) {
        for _ in 0..frames {
            self.paint();
        }
    }
}
