use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::backend::DecodedFrame;

use super::loader::{FramePoll, FrameSource};

/// Still image decoded once on a worker thread.
#[derive(Debug)]
pub struct ImageSource {
    receiver: Receiver<Result<DecodedFrame, String>>,
    delivered: bool,
}

impl ImageSource {
    pub fn spawn(path: PathBuf) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let failure = sender.clone();
        let spawned = thread::Builder::new()
            .name("image-decode".into())
            .spawn(move || {
                // The receiver may be gone already if the media was replaced.
                let _ = sender.send(decode_image(&path));
            });
        if let Err(err) = spawned {
            let _ = failure.send(Err(format!("failed to spawn image decoder: {err}")));
        }

        Self {
            receiver,
            delivered: false,
        }
    }
}

impl FrameSource for ImageSource {
    fn poll_frame(&mut self) -> FramePoll {
        match self.receiver.try_recv() {
            Ok(Ok(frame)) => {
                self.delivered = true;
                FramePoll::Frame(frame)
            }
            Ok(Err(reason)) => FramePoll::Failed(reason),
            Err(TryRecvError::Empty) => FramePoll::Pending,
            Err(TryRecvError::Disconnected) if self.delivered => FramePoll::Ended,
            Err(TryRecvError::Disconnected) => {
                FramePoll::Failed("image decoder exited without a result".into())
            }
        }
    }

    fn is_continuous(&self) -> bool {
        false
    }
}

/// Decodes any supported still format into tightly packed RGBA8.
pub(crate) fn decode_image(path: &Path) -> Result<DecodedFrame, String> {
    let image = image::open(path)
        .map_err(|err| format!("failed to decode image {}: {err}", path.display()))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    tracing::debug!(width, height, path = %path.display(), "decoded image");
    Ok(DecodedFrame::new(rgba.into_raw(), width, height))
}
