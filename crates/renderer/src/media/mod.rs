//! Media texture pipeline.
//!
//! A [`MediaReference`] is opened through a [`MediaLoader`] into a
//! [`FrameSource`] that decodes off the render thread. The pipeline polls the
//! source from its own paint callback, independent of the render loop, and
//! keeps exactly one texture alive for the current reference:
//!
//! - images are uploaded once, after which the refresh stops;
//! - videos re-upload the newest decoded frame into the same texture on every
//!   refresh until the source ends or fails.
//!
//! Replacing or clearing the reference cancels the pending refresh before the
//! texture is disposed.

mod loader;
mod still;
mod video;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::backend::{
    BackendError, DecodedFrame, RenderBackend, SurfaceSize, TextureHandle, UploadOptions,
};
use crate::resources::{ResourceError, ResourceManager, TextureKey};
use crate::scheduler::{DisplayHost, FrameRequest, FrameSlot, FrameTask};

pub use self::loader::{DecoderLoader, DecoderOptions, FramePoll, FrameSource, MediaLoader};
pub use self::still::ImageSource;
pub use self::video::{probe_video, VideoMeta, VideoSource};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv", "avi", "m4v", "ogv"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Guesses the kind from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => f.write_str("image"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Immutable description of the media bound to the preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaReference {
    pub kind: MediaKind,
    pub locator: PathBuf,
    pub display_name: String,
}

impl MediaReference {
    pub fn new(kind: MediaKind, locator: impl Into<PathBuf>) -> Self {
        let locator = locator.into();
        let display_name = locator
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| locator.display().to_string());
        Self {
            kind,
            locator,
            display_name,
        }
    }

    pub fn image(locator: impl Into<PathBuf>) -> Self {
        Self::new(MediaKind::Image, locator)
    }

    pub fn video(locator: impl Into<PathBuf>) -> Self {
        Self::new(MediaKind::Video, locator)
    }

    /// Builds a reference whose kind is inferred from the file extension.
    pub fn from_path(locator: impl Into<PathBuf>) -> Option<Self> {
        let locator = locator.into();
        let kind = MediaKind::from_path(&locator)?;
        Some(Self::new(kind, locator))
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaState {
    Empty,
    Decoding,
    Ready { width: u32, height: u32 },
    Failed(String),
}

impl MediaState {
    pub fn is_ready(&self) -> bool {
        matches!(self, MediaState::Ready { .. })
    }

    /// Native dimensions once the first frame has been uploaded.
    pub fn native_size(&self) -> Option<SurfaceSize> {
        match self {
            MediaState::Ready { width, height } => Some(SurfaceSize::new(*width, *height)),
            _ => None,
        }
    }
}

/// Notable transitions reported by [`MediaPipeline::refresh`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaEvent {
    /// A frame with new native dimensions is on the GPU.
    Ready(SurfaceSize),
    Failed(String),
}

struct ActiveMedia {
    reference: MediaReference,
    key: TextureKey,
    source: Box<dyn FrameSource>,
    finished: bool,
}

pub struct MediaPipeline {
    loader: Box<dyn MediaLoader>,
    current: Option<ActiveMedia>,
    state: MediaState,
    refresh: FrameSlot,
    next_key: u64,
}

impl fmt::Debug for MediaPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPipeline")
            .field("reference", &self.reference())
            .field("state", &self.state)
            .field("refresh", &self.refresh)
            .finish()
    }
}

impl MediaPipeline {
    pub fn new(loader: Box<dyn MediaLoader>) -> Self {
        Self {
            loader,
            current: None,
            state: MediaState::Empty,
            refresh: FrameSlot::new(),
            next_key: 0,
        }
    }

    pub fn state(&self) -> &MediaState {
        &self.state
    }

    pub fn reference(&self) -> Option<&MediaReference> {
        self.current.as_ref().map(|active| &active.reference)
    }

    /// The current reference, only once its first frame is on the GPU.
    pub fn ready_reference(&self) -> Option<&MediaReference> {
        if self.state.is_ready() {
            self.reference()
        } else {
            None
        }
    }

    /// Texture to sample this frame, if any.
    pub fn texture(&self, resources: &ResourceManager) -> Option<TextureHandle> {
        let active = self.current.as_ref()?;
        if !self.state.is_ready() {
            return None;
        }
        resources.texture(active.key)
    }

    /// Replaces the current reference wholesale, or clears it with `None`.
    pub fn set<B, H>(
        &mut self,
        reference: Option<MediaReference>,
        backend: &mut B,
        resources: &mut ResourceManager,
        host: &mut H,
    ) where
        B: RenderBackend + ?Sized,
        H: DisplayHost + ?Sized,
    {
        self.teardown(backend, resources, host);
        let Some(reference) = reference else {
            return;
        };

        tracing::info!(
            kind = %reference.kind,
            name = %reference.display_name,
            "loading media"
        );
        self.next_key += 1;
        let source = self.loader.open(&reference);
        self.current = Some(ActiveMedia {
            reference,
            key: TextureKey(self.next_key),
            source,
            finished: false,
        });
        self.state = MediaState::Decoding;
        self.refresh.schedule(host, FrameTask::MediaRefresh);
    }

    /// Cancels the pending refresh, then disposes the texture and the source.
    pub fn teardown<B, H>(&mut self, backend: &mut B, resources: &mut ResourceManager, host: &mut H)
    where
        B: RenderBackend + ?Sized,
        H: DisplayHost + ?Sized,
    {
        self.refresh.cancel(host);
        if let Some(active) = self.current.take() {
            resources.dispose_texture(backend, active.key);
            tracing::debug!(name = %active.reference.display_name, "media released");
        }
        self.state = MediaState::Empty;
    }

    /// Claims a due request; false for stale or foreign ids.
    pub fn claim(&mut self, request: FrameRequest) -> bool {
        self.refresh.claim(request)
    }

    /// Pulls the newest decoded frame into the texture and reschedules while
    /// the source can still produce frames.
    pub fn refresh<B, H>(
        &mut self,
        backend: &mut B,
        resources: &mut ResourceManager,
        host: &mut H,
    ) -> Result<Option<MediaEvent>, ResourceError>
    where
        B: RenderBackend + ?Sized,
        H: DisplayHost + ?Sized,
    {
        let Some(active) = self.current.as_mut() else {
            return Ok(None);
        };

        let mut event = None;
        match active.source.poll_frame() {
            FramePoll::Pending => {}
            FramePoll::Frame(frame) => {
                upload_frame(backend, resources, active.key, &frame)?;
                let (width, height) = frame.dimensions();
                if self.state.native_size() != Some(SurfaceSize::new(width, height)) {
                    tracing::info!(width, height, name = %active.reference.display_name, "media ready");
                    self.state = MediaState::Ready { width, height };
                    event = Some(MediaEvent::Ready(SurfaceSize::new(width, height)));
                }
            }
            FramePoll::Ended => {
                tracing::debug!(name = %active.reference.display_name, "media source ended");
                active.finished = true;
                if !self.state.is_ready() {
                    let reason = "media source ended before producing a frame".to_string();
                    self.state = MediaState::Failed(reason.clone());
                    event = Some(MediaEvent::Failed(reason));
                }
            }
            FramePoll::Failed(reason) => {
                tracing::warn!(%reason, name = %active.reference.display_name, "media decode failed");
                active.finished = true;
                resources.dispose_texture(backend, active.key);
                self.state = MediaState::Failed(reason.clone());
                event = Some(MediaEvent::Failed(reason));
            }
        }

        let keep_polling = !active.finished
            && (active.source.is_continuous() || !self.state.is_ready());
        if keep_polling {
            self.refresh.schedule(host, FrameTask::MediaRefresh);
        }
        Ok(event)
    }
}

fn upload_frame<B: RenderBackend + ?Sized>(
    backend: &mut B,
    resources: &mut ResourceManager,
    key: TextureKey,
    frame: &DecodedFrame,
) -> Result<(), ResourceError> {
    let texture = match resources.texture(key) {
        Some(texture) => texture,
        None => resources.create_texture(backend, key)?,
    };
    match backend.upload_texture(texture, frame, UploadOptions { flip_y: true }) {
        Ok(()) => Ok(()),
        Err(err @ BackendError::OutOfMemory { .. }) => Err(ResourceError {
            what: "media texture",
            source: err,
        }),
        Err(err) => {
            tracing::warn!(error = %err, "skipping media frame upload");
            Ok(())
        }
    }
}
