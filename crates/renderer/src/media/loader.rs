use std::path::PathBuf;

use crate::backend::DecodedFrame;

use super::still::ImageSource;
use super::video::VideoSource;
use super::{MediaKind, MediaReference};

/// Result of asking a source for its newest frame.
#[derive(Debug)]
pub enum FramePoll {
    /// Nothing new since the last poll.
    Pending,
    Frame(DecodedFrame),
    Failed(String),
    /// The source will not produce further frames.
    Ended,
}

/// A decoder the pipeline polls once per refresh.
pub trait FrameSource {
    /// Returns the newest frame, dropping any older ones still queued.
    fn poll_frame(&mut self) -> FramePoll;
    /// True for sources that keep producing frames after the first.
    fn is_continuous(&self) -> bool;
}

/// Opens media references into frame sources.
pub trait MediaLoader {
    fn open(&mut self, reference: &MediaReference) -> Box<dyn FrameSource>;
}

/// External tools and behaviour used by [`DecoderLoader`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderOptions {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub loop_video: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            loop_video: true,
        }
    }
}

/// Production loader: images through the `image` crate, videos through an
/// `ffmpeg` subprocess.
#[derive(Clone, Debug, Default)]
pub struct DecoderLoader {
    options: DecoderOptions,
}

impl DecoderLoader {
    pub fn new(options: DecoderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }
}

impl MediaLoader for DecoderLoader {
    fn open(&mut self, reference: &MediaReference) -> Box<dyn FrameSource> {
        match reference.kind {
            MediaKind::Image => Box::new(ImageSource::spawn(reference.locator.clone())),
            MediaKind::Video => Box::new(VideoSource::spawn(
                reference.locator.clone(),
                self.options.clone(),
            )),
        }
    }
}
