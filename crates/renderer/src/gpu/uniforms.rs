use bytemuck::{Pod, Zeroable};

use crate::backend::{UniformLocation, UniformValue};
use crate::sizing::Viewport;

/// CPU mirror of the `PreviewFrame` std140 block injected ahead of every
/// fragment program.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct FrameParams {
    pub resolution: [f32; 2],
    pub mouse: [f32; 2],
    /// Top-left corner of the viewport inside the swapchain, in pixels.
    pub origin: [f32; 2],
    pub time: f32,
    pub _padding: f32,
}

/// Uniforms the backend knows how to feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformSlot {
    Resolution,
    Time,
    Mouse,
    Texture,
}

impl UniformSlot {
    pub fn location(self) -> UniformLocation {
        UniformLocation(self as u32)
    }

    pub fn from_location(location: UniformLocation) -> Option<Self> {
        match location.0 {
            0 => Some(UniformSlot::Resolution),
            1 => Some(UniformSlot::Time),
            2 => Some(UniformSlot::Mouse),
            3 => Some(UniformSlot::Texture),
            _ => None,
        }
    }
}

impl FrameParams {
    pub fn set(&mut self, slot: UniformSlot, value: UniformValue) {
        match (slot, value) {
            (UniformSlot::Resolution, UniformValue::Vec2(resolution)) => {
                self.resolution = resolution
            }
            (UniformSlot::Time, UniformValue::Float(time)) => self.time = time,
            (UniformSlot::Mouse, UniformValue::Vec2(mouse)) => self.mouse = mouse,
            // The media texture always lives on unit 0.
            (UniformSlot::Texture, UniformValue::Int(_)) => {}
            (slot, value) => {
                tracing::warn!(?slot, ?value, "ignoring uniform value of the wrong type");
            }
        }
    }

    /// Places the frame inside the swapchain. The resolution follows the
    /// viewport so `gl_FragCoord` stays in range for programs that never
    /// declare `u_resolution`.
    pub fn set_viewport(&mut self, viewport: &Viewport) {
        self.origin = [viewport.x as f32, viewport.y as f32];
        self.resolution = [viewport.width as f32, viewport.height as f32];
    }
}
