//! winit host for the live renderer.
//!
//! The preview window runs its own event loop on a dedicated thread. Callers
//! talk to it through [`PreviewWindow`], which forwards editor actions as
//! user events and hands back [`PreviewEvent`]s over a channel.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::backend::SurfaceSize;
use crate::compile::CompilationResult;
use crate::diagnostics::Diagnostic;
use crate::engine::{EngineError, EngineOptions, LiveRenderer};
use crate::gpu::WgpuBackend;
use crate::media::{DecoderLoader, DecoderOptions, MediaReference};
use crate::runtime::ResumeMode;
use crate::scheduler::{DisplayHost, FrameRequest, FrameTask};

/// Settings for the preview window.
#[derive(Clone, Debug)]
pub struct PreviewOptions {
    pub size: SurfaceSize,
    pub title: String,
    pub autoplay: bool,
    pub resume_mode: ResumeMode,
    pub decoder: DecoderOptions,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            size: SurfaceSize::new(960, 540),
            title: "instantglsl".into(),
            autoplay: true,
            resume_mode: ResumeMode::Continue,
            decoder: DecoderOptions::default(),
        }
    }
}

/// Notifications from the preview thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreviewEvent {
    /// A compile request finished; `Err` carries the first diagnostic.
    Compiled(Result<(), Diagnostic>),
    /// The last compile error was fixed.
    DiagnosticCleared,
    /// Playback was toggled from the keyboard.
    PlaybackChanged { playing: bool },
    /// The renderer hit an error it cannot draw past.
    Failed(String),
    Closed,
}

#[derive(Debug, Clone)]
enum WindowCommand {
    Compile(String),
    SetMedia(Option<MediaReference>),
    Shutdown,
}

/// [`DisplayHost`] backed by a winit window. Every frame request becomes a
/// redraw request; the ids queue up until the next `RedrawRequested`.
pub struct WindowHost {
    window: Arc<Window>,
    pending: Vec<FrameRequest>,
    next_id: u64,
}

impl WindowHost {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            pending: Vec::new(),
            next_id: 0,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl DisplayHost for WindowHost {
    fn request_frame(&mut self, task: FrameTask) -> FrameRequest {
        self.next_id += 1;
        let request = FrameRequest(self.next_id);
        tracing::trace!(%request, ?task, "requesting redraw");
        self.pending.push(request);
        self.window.request_redraw();
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        self.pending.retain(|pending| *pending != request);
    }

    fn take_due(&mut self) -> Vec<FrameRequest> {
        std::mem::take(&mut self.pending)
    }

    fn container_size(&self) -> SurfaceSize {
        let size = self.window.inner_size();
        SurfaceSize::new(size.width, size.height)
    }
}

type WindowRenderer = LiveRenderer<WgpuBackend, WindowHost>;

/// Handle to a preview window running on its own thread.
pub struct PreviewWindow {
    proxy: EventLoopProxy<WindowCommand>,
    events: Receiver<PreviewEvent>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl PreviewWindow {
    /// Opens the window and blocks until its GPU context is ready.
    pub fn spawn(options: PreviewOptions) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let (event_tx, event_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("instantglsl-window".into())
            .spawn(move || run_window_thread(options, ready_tx, event_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let proxy = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            events: event_rx,
            join_handle: Some(handle),
        })
    }

    pub fn compile(&self, source: impl Into<String>) -> Result<()> {
        self.send(WindowCommand::Compile(source.into()))
    }

    pub fn set_media(&self, reference: Option<MediaReference>) -> Result<()> {
        self.send(WindowCommand::SetMedia(reference))
    }

    pub fn events(&self) -> &Receiver<PreviewEvent> {
        &self.events
    }

    /// Blocks until the window is closed.
    pub fn wait(mut self) -> Result<()> {
        self.join()
    }

    pub fn shutdown(mut self) -> Result<()> {
        let _ = self.proxy.send_event(WindowCommand::Shutdown);
        self.join()
    }

    fn send(&self, command: WindowCommand) -> Result<()> {
        self.proxy
            .send_event(command)
            .map_err(|_| anyhow!("preview window has closed"))
    }

    fn join(&mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_window_thread(
    options: PreviewOptions,
    ready_tx: Sender<Result<EventLoopProxy<WindowCommand>>>,
    event_tx: Sender<PreviewEvent>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<WindowCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            let message = format!("failed to create event loop: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };
    let proxy = event_loop.create_proxy();

    let window = WindowBuilder::new()
        .with_title(options.title.clone())
        .with_inner_size(PhysicalSize::new(options.size.width, options.size.height))
        .build(&event_loop);
    let window = match window {
        Ok(window) => Arc::new(window),
        Err(err) => {
            let message = format!("failed to create preview window: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    let inner = window.inner_size();
    let backend = match WgpuBackend::new(window.clone(), SurfaceSize::new(inner.width, inner.height))
    {
        Ok(backend) => backend,
        Err(err) => {
            let message = format!("failed to initialise preview renderer: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    let engine_options = EngineOptions {
        autoplay: options.autoplay,
        resume_mode: options.resume_mode,
    };
    let mut engine = LiveRenderer::new(
        backend,
        WindowHost::new(window.clone()),
        Box::new(DecoderLoader::new(options.decoder.clone())),
        engine_options,
    );
    let listener_tx = event_tx.clone();
    engine.set_diagnostics_listener(Box::new(move |diagnostic| {
        if diagnostic.is_none() {
            let _ = listener_tx.send(PreviewEvent::DiagnosticCleared);
        }
    }));

    let closed_tx = event_tx.clone();
    let _ = ready_tx.send(Ok(proxy));
    tracing::info!(size = %options.size, "preview window ready");

    let run_result = event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);
        match event {
            Event::UserEvent(command) => match command {
                WindowCommand::Compile(source) => {
                    let outcome = match engine.compile(&source) {
                        Ok(CompilationResult::Linked { .. }) => PreviewEvent::Compiled(Ok(())),
                        Ok(failed) => match failed.diagnostic() {
                            Some(diagnostic) => PreviewEvent::Compiled(Err(diagnostic)),
                            None => PreviewEvent::Compiled(Ok(())),
                        },
                        Err(err) => {
                            report_engine_error(&event_tx, &err);
                            if matches!(err, EngineError::ContextUnavailable(_)) {
                                elwt.exit();
                            }
                            return;
                        }
                    };
                    let _ = event_tx.send(outcome);
                }
                WindowCommand::SetMedia(reference) => {
                    if let Some(reference) = reference.as_ref() {
                        tracing::info!(
                            kind = %reference.kind,
                            name = %reference.display_name,
                            "binding media"
                        );
                    }
                    if let Err(err) = engine.set_media(reference) {
                        report_engine_error(&event_tx, &err);
                    }
                }
                WindowCommand::Shutdown => {
                    engine.shutdown();
                    elwt.exit();
                }
            },
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    engine.shutdown();
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if handle_key(&mut engine, &event, &event_tx) == KeyOutcome::Exit {
                        engine.shutdown();
                        elwt.exit();
                    }
                }
                WindowEvent::MouseInput {
                    state,
                    button: MouseButton::Left,
                    ..
                } => {
                    if let Err(err) = engine.show_original(state == ElementState::Pressed) {
                        report_engine_error(&event_tx, &err);
                    }
                }
                WindowEvent::Focused(false) => {
                    if let Err(err) = engine.show_original(false) {
                        report_engine_error(&event_tx, &err);
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    engine.pointer_moved(surface_pointer(&engine, position));
                }
                WindowEvent::Resized(new_size) => {
                    engine
                        .backend_mut()
                        .resize_swapchain(SurfaceSize::new(new_size.width, new_size.height));
                    engine.container_resized();
                    window.request_redraw();
                }
                WindowEvent::ScaleFactorChanged {
                    mut inner_size_writer,
                    ..
                } => {
                    let _ = inner_size_writer.request_inner_size(window.inner_size());
                }
                WindowEvent::RedrawRequested => {
                    if let Err(err) = engine.on_paint() {
                        report_engine_error(&event_tx, &err);
                        if matches!(err, EngineError::ContextUnavailable(_)) {
                            elwt.exit();
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    });

    let _ = closed_tx.send(PreviewEvent::Closed);
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

fn report_engine_error(events: &Sender<PreviewEvent>, err: &EngineError) {
    tracing::error!(error = %err, "preview renderer error");
    let _ = events.send(PreviewEvent::Failed(err.to_string()));
}

#[derive(Debug, PartialEq, Eq)]
enum KeyOutcome {
    Handled,
    Exit,
}

fn handle_key(
    engine: &mut WindowRenderer,
    event: &KeyEvent,
    events: &Sender<PreviewEvent>,
) -> KeyOutcome {
    if event.state != ElementState::Pressed || event.repeat {
        return KeyOutcome::Handled;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Escape) => KeyOutcome::Exit,
        Key::Named(NamedKey::Space) => {
            let playing = engine.toggle_playback();
            tracing::info!(playing, "playback toggled");
            let _ = events.send(PreviewEvent::PlaybackChanged { playing });
            KeyOutcome::Handled
        }
        Key::Named(NamedKey::Delete) | Key::Named(NamedKey::Backspace) => {
            if let Err(err) = engine.remove_media() {
                report_engine_error(events, &err);
            }
            KeyOutcome::Handled
        }
        _ => KeyOutcome::Handled,
    }
}

fn surface_pointer(engine: &WindowRenderer, position: PhysicalPosition<f64>) -> [f32; 2] {
    engine
        .backend()
        .viewport()
        .to_surface_coords(position.x, position.y)
}
