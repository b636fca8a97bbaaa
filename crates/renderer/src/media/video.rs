//! Streaming video decode through an `ffmpeg` subprocess.
//!
//! `ffprobe` reports the stream dimensions, then `ffmpeg` is asked for raw
//! RGBA frames on stdout at the native frame rate (`-re`), looping forever when
//! configured to. A worker thread slices stdout into frames and pushes them over
//! a small bounded channel; the render side only ever keeps the newest one.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::backend::DecodedFrame;

use super::loader::{DecoderOptions, FramePoll, FrameSource};

/// Frames buffered between the decoder thread and the render thread.
const FRAME_QUEUE_DEPTH: usize = 2;

/// Video metadata from ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl VideoMeta {
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Probes the first video stream of `path`.
pub fn probe_video(ffprobe: &Path, path: &Path) -> Result<VideoMeta, String> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|err| format!("failed to run {}: {err}", ffprobe.display()))?;

    if !output.status.success() {
        return Err(format!(
            "{} could not read {}",
            ffprobe.display(),
            path.display()
        ));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoMeta, String> {
    let json: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|err| format!("failed to parse ffprobe output: {err}"))?;
    let stream = json["streams"]
        .as_array()
        .and_then(|streams| {
            streams
                .iter()
                .find(|stream| stream["codec_type"].as_str() == Some("video"))
        })
        .ok_or("no video stream found")?;

    let width = stream["width"].as_u64().ok_or("video stream has no width")?;
    let height = stream["height"].as_u64().ok_or("video stream has no height")?;
    if width == 0 || height == 0 || width > u64::from(u32::MAX) || height > u64::from(u32::MAX) {
        return Err(format!("invalid video dimensions {width}x{height}"));
    }
    let fps = parse_frame_rate(stream["r_frame_rate"].as_str().unwrap_or("30/1"));

    Ok(VideoMeta {
        width: width as u32,
        height: height as u32,
        fps,
    })
}

fn parse_frame_rate(rate: &str) -> f64 {
    let parsed = match rate.split_once('/') {
        Some((num, den)) => match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(num), Ok(den)) if den > 0.0 => num / den,
            _ => 30.0,
        },
        None => rate.parse().unwrap_or(30.0),
    };
    if parsed.is_finite() && parsed > 0.0 {
        parsed
    } else {
        30.0
    }
}

/// Continuously decoded video, newest frame wins.
#[derive(Debug)]
pub struct VideoSource {
    receiver: Receiver<Result<DecodedFrame, String>>,
    shutdown: Arc<AtomicBool>,
    delivered: bool,
}

impl VideoSource {
    pub fn spawn(path: PathBuf, options: DecoderOptions) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(FRAME_QUEUE_DEPTH);
        let shutdown = Arc::new(AtomicBool::new(false));
        let failure = sender.clone();
        let thread_shutdown = shutdown.clone();
        let spawned = thread::Builder::new()
            .name("video-decode".into())
            .spawn(move || decode_thread(&path, &options, &sender, &thread_shutdown));
        if let Err(err) = spawned {
            let _ = failure.send(Err(format!("failed to spawn video decoder: {err}")));
        }

        Self {
            receiver,
            shutdown,
            delivered: false,
        }
    }
}

impl FrameSource for VideoSource {
    fn poll_frame(&mut self) -> FramePoll {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(Ok(frame)) => latest = Some(frame),
                Ok(Err(reason)) => return FramePoll::Failed(reason),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if latest.is_some() {
                        break;
                    }
                    return if self.delivered {
                        FramePoll::Ended
                    } else {
                        FramePoll::Failed("video decoder exited without producing a frame".into())
                    };
                }
            }
        }

        match latest {
            Some(frame) => {
                self.delivered = true;
                FramePoll::Frame(frame)
            }
            None => FramePoll::Pending,
        }
    }

    fn is_continuous(&self) -> bool {
        true
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        // The thread also exits on its next send once the receiver is gone.
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

fn decode_thread(
    path: &Path,
    options: &DecoderOptions,
    sender: &Sender<Result<DecodedFrame, String>>,
    shutdown: &AtomicBool,
) {
    let meta = match probe_video(&options.ffprobe, path) {
        Ok(meta) => meta,
        Err(reason) => {
            let _ = sender.send(Err(reason));
            return;
        }
    };
    tracing::debug!(
        width = meta.width,
        height = meta.height,
        fps = meta.fps,
        path = %path.display(),
        "probed video"
    );

    let mut child = match spawn_ffmpeg(path, options, &meta) {
        Ok(child) => child,
        Err(reason) => {
            let _ = sender.send(Err(reason));
            return;
        }
    };

    let result = stream_frames(&mut child, &meta, sender, shutdown);
    let _ = child.kill();
    let _ = child.wait();
    if let Err(reason) = result {
        let _ = sender.send(Err(reason));
    }
}

fn spawn_ffmpeg(path: &Path, options: &DecoderOptions, meta: &VideoMeta) -> Result<Child, String> {
    let mut command = Command::new(&options.ffmpeg);
    command.args(["-v", "quiet", "-re"]);
    if options.loop_video {
        command.args(["-stream_loop", "-1"]);
    }
    command
        .arg("-i")
        .arg(path)
        .args([
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", meta.width, meta.height),
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| format!("failed to spawn {}: {err}", options.ffmpeg.display()))
}

/// Reads frames until EOF, shutdown, or the receiver hangs up.
fn stream_frames(
    child: &mut Child,
    meta: &VideoMeta,
    sender: &Sender<Result<DecodedFrame, String>>,
    shutdown: &AtomicBool,
) -> Result<(), String> {
    let mut stdout = child.stdout.take().ok_or("ffmpeg has no stdout pipe")?;
    let mut frames = 0u64;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }
        let mut buffer = vec![0u8; meta.frame_bytes()];
        if stdout.read_exact(&mut buffer).is_err() {
            break;
        }
        frames += 1;
        let frame = DecodedFrame::new(buffer, meta.width, meta.height);
        if sender.send(Ok(frame)).is_err() {
            return Ok(());
        }
    }

    if frames == 0 {
        return Err("ffmpeg decoded zero frames".into());
    }
    tracing::debug!(frames, "video stream ended");
    Ok(())
}
