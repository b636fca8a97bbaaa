use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Abstraction over where the render loop reads the current instant from.
pub trait TimeSource {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time source that only moves when told to.
///
/// Clones share the same clock, so a test can keep one handle and give the
/// other to the engine.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    now: Rc<Cell<Instant>>,
}

impl ManualTimeSource {
    /// Creates a manual clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Convenient alias for owning time sources behind trait objects.
pub type BoxedTimeSource = Box<dyn TimeSource>;

/// How elapsed time behaves when playback resumes after a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeMode {
    /// Shift the origin so animation continues from the paused timestamp.
    #[default]
    Continue,
    /// Start counting from zero again.
    Restart,
}

impl ResumeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeMode::Continue => "continue",
            ResumeMode::Restart => "restart",
        }
    }
}

impl fmt::Display for ResumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResumeMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(ResumeMode::Continue),
            "restart" => Ok(ResumeMode::Restart),
            other => Err(format!(
                "unknown resume mode '{other}' (expected 'continue' or 'restart')"
            )),
        }
    }
}

/// Playback flag, elapsed-time origin and pointer position read by each frame.
#[derive(Debug, Clone)]
pub struct RenderState {
    is_playing: bool,
    origin: Instant,
    paused_at: Option<Instant>,
    pointer: [f32; 2],
    resume_mode: ResumeMode,
}

impl RenderState {
    /// Creates a state whose clock starts at `now`.
    pub fn new(now: Instant, playing: bool, resume_mode: ResumeMode) -> Self {
        Self {
            is_playing: playing,
            origin: now,
            paused_at: (!playing).then_some(now),
            pointer: [0.0, 0.0],
            resume_mode,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn resume_mode(&self) -> ResumeMode {
        self.resume_mode
    }

    pub fn pointer(&self) -> [f32; 2] {
        self.pointer
    }

    pub fn set_pointer(&mut self, position: [f32; 2]) {
        self.pointer = position;
    }

    /// Seconds since the origin, frozen while paused.
    pub fn elapsed(&self, now: Instant) -> f32 {
        let reference = self.paused_at.unwrap_or(now);
        reference.saturating_duration_since(self.origin).as_secs_f32()
    }

    /// Returns false when already paused.
    pub fn pause(&mut self, now: Instant) -> bool {
        if !self.is_playing {
            return false;
        }
        self.is_playing = false;
        self.paused_at = Some(now);
        true
    }

    /// Re-bases the origin according to the resume mode. Returns false when
    /// already playing.
    pub fn resume(&mut self, now: Instant) -> bool {
        if self.is_playing {
            return false;
        }
        let paused_at = self.paused_at.take().unwrap_or(now);
        self.origin = match self.resume_mode {
            ResumeMode::Continue => self.origin + now.saturating_duration_since(paused_at),
            ResumeMode::Restart => now,
        };
        self.is_playing = true;
        true
    }
}
