//! Per-paint frame scheduling and the render step.
//!
//! Hosts deliver paint opportunities as [`FrameRequest`] ids. Every component
//! that wants a callback keeps exactly one pending id in a [`FrameSlot`] and
//! ignores any id it no longer holds, which makes cancelled and stale requests
//! harmless.

use std::fmt;

use crate::backend::{
    BackendError, ProgramHandle, RenderBackend, SurfaceSize, TextureHandle, UniformValue,
};
use crate::resources::QUAD_VERTEX_COUNT;

pub const RESOLUTION_UNIFORM: &str = "u_resolution";
pub const TIME_UNIFORM: &str = "u_time";
pub const MOUSE_UNIFORM: &str = "u_mouse";
pub const TEXTURE_UNIFORM: &str = "u_texture";

/// Texture unit the media texture is bound to.
pub const MEDIA_TEXTURE_UNIT: u32 = 0;

/// Identifier of a scheduled paint callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequest(pub u64);

impl fmt::Display for FrameRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// What a scheduled callback is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameTask {
    Draw,
    MediaRefresh,
}

/// Platform surface the engine renders into.
pub trait DisplayHost {
    /// Asks for a callback at the next paint opportunity.
    fn request_frame(&mut self, task: FrameTask) -> FrameRequest;
    /// Cancels a pending request. Unknown ids are ignored.
    fn cancel_frame(&mut self, request: FrameRequest);
    /// Removes and returns the requests due at this paint opportunity.
    fn take_due(&mut self) -> Vec<FrameRequest>;
    /// Current pixel size of the space the surface lives in.
    fn container_size(&self) -> SurfaceSize;
}

/// Holds at most one pending frame request.
#[derive(Debug, Default)]
pub struct FrameSlot {
    pending: Option<FrameRequest>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<FrameRequest> {
        self.pending
    }

    /// Replaces any pending request with a fresh one.
    pub fn schedule<H: DisplayHost + ?Sized>(&mut self, host: &mut H, task: FrameTask) {
        self.cancel(host);
        self.pending = Some(host.request_frame(task));
    }

    pub fn cancel<H: DisplayHost + ?Sized>(&mut self, host: &mut H) {
        if let Some(request) = self.pending.take() {
            host.cancel_frame(request);
        }
    }

    /// Consumes `request` if it is the one this slot is waiting for.
    pub fn claim(&mut self, request: FrameRequest) -> bool {
        if self.pending == Some(request) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// Everything a single render step reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    pub program: Option<ProgramHandle>,
    pub target: SurfaceSize,
    pub time: f32,
    pub pointer: [f32; 2],
    pub texture: Option<TextureHandle>,
}

/// Draws one frame per paint callback while running.
#[derive(Debug)]
pub struct RenderLoop {
    state: LoopState,
    slot: FrameSlot,
    surface: Option<SurfaceSize>,
    frames_drawn: u64,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            state: LoopState::Stopped,
            slot: FrameSlot::new(),
            surface: None,
            frames_drawn: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn has_pending_frame(&self) -> bool {
        self.slot.is_pending()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Size the surface was last resized to.
    pub fn surface_size(&self) -> Option<SurfaceSize> {
        self.surface
    }

    /// Cancels any pending step and schedules a new one.
    pub fn start<H: DisplayHost + ?Sized>(&mut self, host: &mut H) {
        self.state = LoopState::Running;
        self.slot.schedule(host, FrameTask::Draw);
    }

    /// Returns false when the loop was not running.
    pub fn pause<H: DisplayHost + ?Sized>(&mut self, host: &mut H) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.slot.cancel(host);
        self.state = LoopState::Stopped;
        true
    }

    /// Returns false when the loop was already running.
    pub fn resume<H: DisplayHost + ?Sized>(&mut self, host: &mut H) -> bool {
        if self.state == LoopState::Running {
            return false;
        }
        self.start(host);
        true
    }

    /// Schedules a single draw while stopped so a change shows up without
    /// restarting playback. Does nothing while running or already pending.
    pub fn request_redraw<H: DisplayHost + ?Sized>(&mut self, host: &mut H) {
        if self.state == LoopState::Stopped && !self.slot.is_pending() {
            self.slot.schedule(host, FrameTask::Draw);
        }
    }

    /// Cancels the pending step. GPU resources are left alone.
    pub fn stop<H: DisplayHost + ?Sized>(&mut self, host: &mut H) {
        self.slot.cancel(host);
        self.state = LoopState::Stopped;
    }

    /// Claims a due request; false for stale or foreign ids.
    pub fn claim(&mut self, request: FrameRequest) -> bool {
        self.slot.claim(request)
    }

    /// Forces the next step to resize the surface.
    pub fn invalidate_surface(&mut self) {
        self.surface = None;
    }

    /// Runs one render step and reschedules while running.
    ///
    /// A surface that is unavailable for this frame only skips the draw. Any
    /// other backend failure stops the loop and is returned.
    pub fn step<B, H>(
        &mut self,
        backend: &mut B,
        host: &mut H,
        inputs: FrameInputs,
    ) -> Result<(), BackendError>
    where
        B: RenderBackend + ?Sized,
        H: DisplayHost + ?Sized,
    {
        match self.draw(backend, inputs) {
            Ok(()) => {}
            Err(BackendError::SurfaceUnavailable(reason)) => {
                tracing::debug!(%reason, "skipping frame");
            }
            Err(err) => {
                self.stop(host);
                return Err(err);
            }
        }

        if self.state == LoopState::Running {
            self.slot.schedule(host, FrameTask::Draw);
        }
        Ok(())
    }

    fn draw<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        inputs: FrameInputs,
    ) -> Result<(), BackendError> {
        if inputs.target.is_empty() {
            return Ok(());
        }
        if self.surface != Some(inputs.target) {
            backend.resize_surface(inputs.target);
            self.surface = Some(inputs.target);
            tracing::debug!(size = %inputs.target, "render surface resized");
        }

        let Some(program) = inputs.program else {
            return Ok(());
        };
        backend.use_program(program);

        if let Some(location) = backend.uniform_location(program, RESOLUTION_UNIFORM) {
            let resolution = [inputs.target.width as f32, inputs.target.height as f32];
            backend.set_uniform(location, UniformValue::Vec2(resolution));
        }
        if let Some(location) = backend.uniform_location(program, TIME_UNIFORM) {
            backend.set_uniform(location, UniformValue::Float(inputs.time));
        }
        if let Some(location) = backend.uniform_location(program, MOUSE_UNIFORM) {
            backend.set_uniform(location, UniformValue::Vec2(inputs.pointer));
        }
        backend.bind_texture(MEDIA_TEXTURE_UNIT, inputs.texture);
        if let Some(location) = backend.uniform_location(program, TEXTURE_UNIFORM) {
            backend.set_uniform(location, UniformValue::Int(MEDIA_TEXTURE_UNIT as i32));
        }

        backend.draw_arrays(0, QUAD_VERTEX_COUNT)?;
        self.frames_drawn = self.frames_drawn.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct QueueHost {
        next: u64,
        pending: Vec<FrameRequest>,
        cancelled: Vec<FrameRequest>,
    }

    impl DisplayHost for QueueHost {
        fn request_frame(&mut self, _task: FrameTask) -> FrameRequest {
            self.next += 1;
            let request = FrameRequest(self.next);
            self.pending.push(request);
            request
        }

        fn cancel_frame(&mut self, request: FrameRequest) {
            self.pending.retain(|pending| *pending != request);
            self.cancelled.push(request);
        }

        fn take_due(&mut self) -> Vec<FrameRequest> {
            std::mem::take(&mut self.pending)
        }

        fn container_size(&self) -> SurfaceSize {
            SurfaceSize::new(640, 480)
        }
    }

    #[test]
    fn slot_claims_only_its_request() {
        let mut host = QueueHost::default();
        let mut slot = FrameSlot::new();
        slot.schedule(&mut host, FrameTask::Draw);
        let first = slot.pending().unwrap();
        slot.schedule(&mut host, FrameTask::Draw);

        assert!(!slot.claim(first));
        assert_eq!(host.cancelled, vec![first]);
        assert_eq!(host.pending.len(), 1);
        let second = host.pending[0];
        assert!(slot.claim(second));
        assert!(!slot.claim(second));
    }

    #[test]
    fn start_replaces_pending_step() {
        let mut host = QueueHost::default();
        let mut render_loop = RenderLoop::new();
        render_loop.start(&mut host);
        render_loop.start(&mut host);
        assert_eq!(host.pending.len(), 1);
        assert!(render_loop.is_running());
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let mut host = QueueHost::default();
        let mut render_loop = RenderLoop::new();
        render_loop.start(&mut host);

        assert!(render_loop.pause(&mut host));
        assert!(!render_loop.pause(&mut host));
        assert!(host.pending.is_empty());

        assert!(render_loop.resume(&mut host));
        assert!(!render_loop.resume(&mut host));
        assert_eq!(host.pending.len(), 1);
    }

    #[test]
    fn stop_cancels_pending_step() {
        let mut host = QueueHost::default();
        let mut render_loop = RenderLoop::new();
        render_loop.start(&mut host);
        render_loop.stop(&mut host);
        assert_eq!(render_loop.state(), LoopState::Stopped);
        assert!(host.pending.is_empty());
        assert!(!render_loop.has_pending_frame());
    }

    #[test]
    fn redraw_is_one_shot_and_only_while_stopped() {
        let mut host = QueueHost::default();
        let mut render_loop = RenderLoop::new();
        render_loop.request_redraw(&mut host);
        render_loop.request_redraw(&mut host);
        assert_eq!(host.pending.len(), 1);
        assert_eq!(render_loop.state(), LoopState::Stopped);

        render_loop.start(&mut host);
        let running = host.pending.clone();
        render_loop.request_redraw(&mut host);
        assert_eq!(host.pending.len(), 1);
        assert_eq!(host.pending, running);
    }
}
