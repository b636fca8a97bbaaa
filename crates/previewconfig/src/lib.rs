use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

/// Largest window edge accepted from configuration.
pub const MAX_WINDOW_EDGE: u32 = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How elapsed shader time behaves when playback resumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeSetting {
    #[default]
    Continue,
    Restart,
}

impl ResumeSetting {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeSetting::Continue => "continue",
            ResumeSetting::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PreviewConfig {
    pub version: u32,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub playback: PlaybackSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub media: MediaSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowSection {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "InstantGLSL".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackSection {
    pub autoplay: bool,
    pub resume: ResumeSetting,
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self {
            autoplay: true,
            resume: ResumeSetting::Continue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct WatchSection {
    #[serde(default = "default_watch_enabled")]
    pub enabled: bool,
    #[serde(
        default = "default_debounce",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub debounce: Duration,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            enabled: default_watch_enabled(),
            debounce: default_debounce(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaSection {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub loop_video: bool,
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            loop_video: true,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            window: WindowSection::default(),
            playback: PlaybackSection::default(),
            watch: WatchSection::default(),
            media: MediaSection::default(),
        }
    }
}

fn default_watch_enabled() -> bool {
    true
}

fn default_debounce() -> Duration {
    Duration::from_millis(100)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Duration::try_from_secs_f64(v)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

impl PreviewConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PreviewConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads `path` when it exists, falling back to defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|err| ConfigError::Invalid(format!("failed to serialise config: {err}")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        let window = &self.window;
        if window.width == 0 || window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be non-zero",
                window.width, window.height
            )));
        }
        if window.width > MAX_WINDOW_EDGE || window.height > MAX_WINDOW_EDGE {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} exceeds {MAX_WINDOW_EDGE} pixels",
                window.width, window.height
            )));
        }

        if self.watch.enabled && self.watch.debounce.is_zero() {
            return Err(ConfigError::Invalid(
                "watch.debounce must be greater than zero".into(),
            ));
        }

        if self.media.ffmpeg.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("media.ffmpeg may not be empty".into()));
        }
        if self.media.ffprobe.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("media.ffprobe may not be empty".into()));
        }

        Ok(())
    }
}
