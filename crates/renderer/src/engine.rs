//! The live rendering engine.
//!
//! [`LiveRenderer`] owns one backend, one display host and every component
//! that allocates GPU state. Hosts feed it three kinds of input: editor
//! actions (`compile`, `set_media`, playback controls), pointer/resize
//! notifications, and paint opportunities via [`LiveRenderer::on_paint`].

use std::fmt;

use crate::backend::{BackendError, RenderBackend, SurfaceSize};
use crate::compile::{compile_original, compile_program, CompilationResult};
use crate::diagnostics::Diagnostic;
use crate::media::{MediaEvent, MediaLoader, MediaPipeline, MediaReference, MediaState};
use crate::resources::{ResourceCounts, ResourceError, ResourceManager};
use crate::runtime::{BoxedTimeSource, RenderState, ResumeMode, SystemTimeSource};
use crate::scheduler::{DisplayHost, FrameInputs, FrameRequest, LoopState, RenderLoop};
use crate::sizing::SurfaceGeometry;

/// Callback receiving the current diagnostic, or `None` once it is cleared.
pub type DiagnosticsListener = Box<dyn FnMut(Option<&Diagnostic>)>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("GPU context unavailable: {0}")]
    ContextUnavailable(String),
    #[error(transparent)]
    ResourceExhaustion(#[from] ResourceError),
}

impl EngineError {
    fn from_backend(what: &'static str, err: BackendError) -> Self {
        match err {
            BackendError::ContextUnavailable(reason) => EngineError::ContextUnavailable(reason),
            other => EngineError::ResourceExhaustion(ResourceError { what, source: other }),
        }
    }
}

/// Start-up behaviour of a [`LiveRenderer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// Begin animating as soon as the first program links.
    pub autoplay: bool,
    pub resume_mode: ResumeMode,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            autoplay: true,
            resume_mode: ResumeMode::Continue,
        }
    }
}

pub struct LiveRenderer<B: RenderBackend, H: DisplayHost> {
    backend: B,
    host: H,
    resources: ResourceManager,
    media: MediaPipeline,
    render_loop: RenderLoop,
    state: RenderState,
    clock: BoxedTimeSource,
    geometry: Option<SurfaceGeometry>,
    last_diagnostic: Option<Diagnostic>,
    listener: Option<DiagnosticsListener>,
    showing_original: bool,
    shut_down: bool,
}

impl<B: RenderBackend, H: DisplayHost> fmt::Debug for LiveRenderer<B, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveRenderer")
            .field("resources", &self.resources)
            .field("media", &self.media)
            .field("render_loop", &self.render_loop)
            .field("state", &self.state)
            .field("geometry", &self.geometry)
            .field("last_diagnostic", &self.last_diagnostic)
            .field("showing_original", &self.showing_original)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl<B: RenderBackend, H: DisplayHost> LiveRenderer<B, H> {
    pub fn new(backend: B, host: H, loader: Box<dyn MediaLoader>, options: EngineOptions) -> Self {
        Self::with_time_source(backend, host, loader, options, Box::new(SystemTimeSource::new()))
    }

    pub fn with_time_source(
        backend: B,
        host: H,
        loader: Box<dyn MediaLoader>,
        options: EngineOptions,
        clock: BoxedTimeSource,
    ) -> Self {
        let state = RenderState::new(clock.now(), options.autoplay, options.resume_mode);
        Self {
            backend,
            host,
            resources: ResourceManager::new(),
            media: MediaPipeline::new(loader),
            render_loop: RenderLoop::new(),
            state,
            clock,
            geometry: None,
            last_diagnostic: None,
            listener: None,
            showing_original: false,
            shut_down: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn set_diagnostics_listener(&mut self, listener: DiagnosticsListener) {
        self.listener = Some(listener);
    }

    /// Compiles and links `source`, installing it on success.
    ///
    /// Compile and link failures are returned as [`CompilationResult::Failed`]
    /// while the previous program keeps rendering.
    pub fn compile(&mut self, source: &str) -> Result<CompilationResult, EngineError> {
        self.ensure_alive()?;
        let result = match compile_program(&mut self.backend, &mut self.resources, source) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "stopping render loop");
                self.render_loop.stop(&mut self.host);
                return Err(err.into());
            }
        };

        match &result {
            CompilationResult::Linked { program } => {
                tracing::info!(%program, "shader compiled");
                self.publish_diagnostic(None);
                if self.state.is_playing() && !self.render_loop.is_running() {
                    self.render_loop.start(&mut self.host);
                }
            }
            CompilationResult::Failed { stage, line, .. } => {
                tracing::info!(%stage, line = ?line, "shader failed to compile");
                self.publish_diagnostic(result.diagnostic());
            }
        }
        Ok(result)
    }

    /// Replaces the bound media, or clears it with `None`.
    pub fn set_media(&mut self, reference: Option<MediaReference>) -> Result<(), EngineError> {
        self.ensure_alive()?;
        self.media.set(
            reference,
            &mut self.backend,
            &mut self.resources,
            &mut self.host,
        );
        self.geometry = None;
        Ok(())
    }

    pub fn remove_media(&mut self) -> Result<(), EngineError> {
        self.set_media(None)
    }

    /// Marks playback as running and (re)starts the loop once a program exists.
    pub fn start(&mut self) {
        if self.shut_down {
            return;
        }
        self.state.resume(self.clock.now());
        if self.resources.active_program().is_some() {
            self.render_loop.start(&mut self.host);
        }
    }

    pub fn pause(&mut self) {
        if self.state.pause(self.clock.now()) {
            tracing::debug!("playback paused");
        }
        self.render_loop.pause(&mut self.host);
    }

    pub fn resume(&mut self) {
        if self.shut_down {
            return;
        }
        if self.state.resume(self.clock.now()) {
            tracing::debug!(mode = %self.state.resume_mode(), "playback resumed");
        }
        if self.resources.active_program().is_some() {
            self.render_loop.resume(&mut self.host);
        }
    }

    /// Flips between playing and paused; returns whether playback is now on.
    pub fn toggle_playback(&mut self) -> bool {
        if self.state.is_playing() {
            self.pause();
        } else {
            self.resume();
        }
        self.state.is_playing()
    }

    /// Cancels the pending render step without releasing anything.
    pub fn stop(&mut self) {
        self.render_loop.stop(&mut self.host);
        self.state.pause(self.clock.now());
    }

    /// Records the pointer position in surface pixels, bottom-left origin.
    pub fn pointer_moved(&mut self, position: [f32; 2]) {
        self.state.set_pointer(position);
    }

    /// Recomputes the surface geometry after the host container changed size.
    pub fn container_resized(&mut self) {
        if let Some(native) = self.media.state().native_size() {
            self.geometry = SurfaceGeometry::fit(native, self.host.container_size());
        }
        self.render_loop.invalidate_surface();
    }

    /// Runs every request the host reports as due.
    pub fn on_paint(&mut self) -> Result<(), EngineError> {
        for request in self.host.take_due() {
            self.run_frame(request)?;
        }
        Ok(())
    }

    /// Runs the callback behind `request`. Stale and cancelled ids are ignored.
    pub fn run_frame(&mut self, request: FrameRequest) -> Result<(), EngineError> {
        if self.shut_down {
            return Ok(());
        }

        if self.media.claim(request) {
            return self.refresh_media();
        }

        if self.render_loop.claim(request) {
            let inputs = self.frame_inputs();
            return self
                .render_loop
                .step(&mut self.backend, &mut self.host, inputs)
                .map_err(|err| {
                    tracing::error!(error = %err, "render loop stopped");
                    EngineError::from_backend("frame", err)
                });
        }

        tracing::trace!(%request, "ignoring stale frame request");
        Ok(())
    }

    /// Media to show when the user asks for the unprocessed original.
    pub fn original_media(&self) -> Option<&MediaReference> {
        self.media.ready_reference()
    }

    /// Draws the bound media without the user program while `held` is true.
    ///
    /// The passthrough program is linked on first use. Without ready media the
    /// user program keeps drawing. A paused preview gets a single redraw so the
    /// switch is visible either way.
    pub fn show_original(&mut self, held: bool) -> Result<(), EngineError> {
        self.ensure_alive()?;
        if held && self.resources.original_program().is_none() {
            match compile_original(&mut self.backend, &mut self.resources) {
                Ok(CompilationResult::Linked { program }) => {
                    tracing::debug!(%program, "passthrough program linked");
                }
                Ok(CompilationResult::Failed { stage, message, .. }) => {
                    tracing::warn!(%stage, %message, "passthrough program failed");
                    return Ok(());
                }
                Err(err) => {
                    tracing::error!(error = %err, "stopping render loop");
                    self.render_loop.stop(&mut self.host);
                    return Err(err.into());
                }
            }
        }
        if self.showing_original == held {
            return Ok(());
        }
        self.showing_original = held;
        tracing::debug!(held, media = self.original_media().is_some(), "show original");
        self.render_loop.request_redraw(&mut self.host);
        Ok(())
    }

    /// True while the original is requested and there is media to show.
    pub fn is_showing_original(&self) -> bool {
        self.showing_original && self.media.texture(&self.resources).is_some()
    }

    pub fn media_state(&self) -> &MediaState {
        self.media.state()
    }

    pub fn surface_geometry(&self) -> Option<SurfaceGeometry> {
        self.geometry
    }

    /// Size the next frame renders at.
    pub fn target_size(&self) -> SurfaceSize {
        self.geometry
            .map(|geometry| geometry.size())
            .unwrap_or_else(|| self.host.container_size())
    }

    pub fn last_diagnostic(&self) -> Option<&Diagnostic> {
        self.last_diagnostic.as_ref()
    }

    pub fn resource_counts(&self) -> ResourceCounts {
        self.resources.counts()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn loop_state(&self) -> LoopState {
        self.render_loop.state()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.render_loop.frames_drawn()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Stops the loop, releases media, then disposes every GPU handle.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.render_loop.stop(&mut self.host);
        self.media
            .teardown(&mut self.backend, &mut self.resources, &mut self.host);
        self.resources.dispose_all(&mut self.backend);
        self.shut_down = true;
        tracing::info!("renderer shut down");
    }

    fn ensure_alive(&self) -> Result<(), EngineError> {
        if self.shut_down {
            return Err(EngineError::ContextUnavailable(
                "renderer has been shut down".into(),
            ));
        }
        Ok(())
    }

    fn refresh_media(&mut self) -> Result<(), EngineError> {
        let event = match self
            .media
            .refresh(&mut self.backend, &mut self.resources, &mut self.host)
        {
            Ok(event) => event,
            Err(err) => {
                tracing::error!(error = %err, "stopping render loop");
                self.render_loop.stop(&mut self.host);
                return Err(err.into());
            }
        };

        match event {
            Some(MediaEvent::Ready(native)) => {
                let container = self.host.container_size();
                self.geometry = SurfaceGeometry::fit(native, container);
                tracing::debug!(
                    native = %native,
                    container = %container,
                    geometry = ?self.geometry,
                    "surface geometry updated"
                );
            }
            Some(MediaEvent::Failed(_)) => self.geometry = None,
            None => {}
        }
        Ok(())
    }

    fn frame_inputs(&self) -> FrameInputs {
        let program = if self.is_showing_original() {
            self.resources.original_program()
        } else {
            self.resources.active_program()
        };
        FrameInputs {
            program,
            target: self.target_size(),
            time: self.state.elapsed(self.clock.now()),
            pointer: self.state.pointer(),
            texture: self.media.texture(&self.resources),
        }
    }

    fn publish_diagnostic(&mut self, diagnostic: Option<Diagnostic>) {
        let changed = diagnostic.is_some() || self.last_diagnostic.is_some();
        self.last_diagnostic = diagnostic;
        if !changed {
            return;
        }
        if let Some(listener) = self.listener.as_mut() {
            listener(self.last_diagnostic.as_ref());
        }
    }
}

impl<B: RenderBackend, H: DisplayHost> Drop for LiveRenderer<B, H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
