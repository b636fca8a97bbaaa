use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use renderer::{MediaKind, ResumeMode, SurfaceSize};

#[derive(Parser, Debug)]
#[command(
    name = "instantglsl",
    author,
    version,
    about = "Live GLSL fragment shader preview",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Fragment shader to preview; recompiled whenever the file changes.
    #[arg(value_name = "SHADER")]
    pub shader: Option<PathBuf>,

    /// Image or video bound to `u_texture`.
    #[arg(long, value_name = "PATH")]
    pub media: Option<PathBuf>,

    /// Media kind when the file extension is ambiguous.
    #[arg(long, value_enum, requires = "media")]
    pub kind: Option<MediaKindArg>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<SurfaceSize>,

    /// Open with playback paused.
    #[arg(long)]
    pub paused: bool,

    /// Elapsed time behaviour on resume: `continue` or `restart`.
    #[arg(long, value_name = "MODE", value_parser = parse_resume_mode)]
    pub resume: Option<ResumeMode>,

    /// Compile the shader once instead of watching it for changes.
    #[arg(long)]
    pub no_watch: bool,

    /// Configuration file; defaults to `config.toml` in the config directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MediaKindArg {
    Image,
    Video,
}

impl From<MediaKindArg> for MediaKind {
    fn from(value: MediaKindArg) -> Self {
        match value {
            MediaKindArg::Image => MediaKind::Image,
            MediaKindArg::Video => MediaKind::Video,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a fragment shader without opening a window.
    Check(CheckArgs),
    /// Inspect or initialise the configuration file.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[arg(value_name = "SHADER")]
    pub shader: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration file path.
    Where,
    /// Write a configuration file populated with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(value: &str) -> Result<SurfaceSize, String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "width must be a whole number of pixels".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "height must be a whole number of pixels".to_string())?;

    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }

    Ok(SurfaceSize::new(width, height))
}

pub fn parse_resume_mode(value: &str) -> Result<ResumeMode, String> {
    value.parse()
}
