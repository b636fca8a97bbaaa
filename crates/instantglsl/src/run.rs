use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, ensure, Context, Result};
use crossbeam_channel::select;
use previewconfig::{PreviewConfig, ResumeSetting};
use renderer::{
    parse_log, validate_fragment, DecoderOptions, MediaReference, PreviewEvent, PreviewOptions,
    PreviewWindow, ResumeMode, SurfaceSize,
};
use tracing_subscriber::EnvFilter;

use crate::cli::{CheckArgs, Cli, Command, ConfigAction, MediaKindArg, RunArgs};
use crate::defaults::DEFAULT_FRAGMENT;
use crate::paths::AppPaths;
use crate::report::render_diagnostic;
use crate::watch::{read_source, ShaderWatcher};

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    match cli.command {
        Some(Command::Check(args)) => check(&args),
        Some(Command::Config(command)) => config_command(command.action, cli.run.config),
        None => preview(cli.run),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn check(args: &CheckArgs) -> Result<()> {
    let source = read_source(&args.shader)?;
    match validate_fragment(&source) {
        Ok(()) => {
            println!("{}: ok", args.shader.display());
            Ok(())
        }
        Err(log) => {
            eprint!("{}", render_diagnostic(&source, &parse_log(&log)));
            bail!("{} failed to compile", args.shader.display())
        }
    }
}

fn config_command(action: ConfigAction, explicit: Option<PathBuf>) -> Result<()> {
    let path = match explicit {
        Some(path) => path,
        None => AppPaths::discover()?.config_file(),
    };

    match action {
        ConfigAction::Where => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite it",
                    path.display()
                );
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create config directory {}", parent.display())
                })?;
            }
            let rendered = PreviewConfig::default().to_toml_string()?;
            fs::write(&path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<PreviewConfig> {
    match explicit {
        Some(path) => PreviewConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => {
            let path = AppPaths::discover()?.config_file();
            let config = PreviewConfig::load_or_default(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            tracing::debug!(path = %path.display(), exists = path.exists(), "resolved config");
            Ok(config)
        }
    }
}

fn preview(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let options = preview_options(&args, &config);
    let watch_enabled = config.watch.enabled && !args.no_watch;

    let (mut watcher, mut source) = match args.shader.as_ref() {
        Some(path) if watch_enabled => {
            let (watcher, source) = ShaderWatcher::open(path, config.watch.debounce)?;
            (Some(watcher), source)
        }
        Some(path) => (None, read_source(path)?),
        None => (None, DEFAULT_FRAGMENT.to_string()),
    };
    let media = args
        .media
        .map(|path| media_reference(path, args.kind))
        .transpose()?;

    tracing::info!(
        shader = %args.shader.as_deref().map_or("<default>".into(), |p| p.display().to_string()),
        size = %options.size,
        watch = watcher.is_some(),
        "opening preview"
    );
    let window = PreviewWindow::spawn(options).context("failed to open preview window")?;
    window.compile(source.clone())?;
    if let Some(media) = media {
        window.set_media(Some(media))?;
    }

    let unwatched = crossbeam_channel::never();
    loop {
        let changes = watcher.as_ref().map_or(&unwatched, ShaderWatcher::changes);
        let mut changed = false;
        select! {
            recv(window.events()) -> event => match event {
                Ok(PreviewEvent::Closed) | Err(_) => break,
                Ok(event) => report_event(&event, &source),
            },
            recv(changes) -> _ => changed = true,
        }

        let Some(watcher) = watcher.as_mut().filter(|_| changed) else {
            continue;
        };
        match watcher.reload() {
            Ok(Some(updated)) => {
                tracing::info!(path = %watcher.path().display(), "shader changed; recompiling");
                source = updated;
                if window.compile(source.clone()).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("{err:#}"),
        }
    }

    window.wait()
}

fn preview_options(args: &RunArgs, config: &PreviewConfig) -> PreviewOptions {
    let size = args
        .size
        .unwrap_or_else(|| SurfaceSize::new(config.window.width, config.window.height));
    let title = match args.shader.as_deref().and_then(Path::file_name) {
        Some(name) => format!("{} - {}", config.window.title, name.to_string_lossy()),
        None => config.window.title.clone(),
    };
    let resume_mode = args.resume.unwrap_or(match config.playback.resume {
        ResumeSetting::Continue => ResumeMode::Continue,
        ResumeSetting::Restart => ResumeMode::Restart,
    });

    PreviewOptions {
        size,
        title,
        autoplay: config.playback.autoplay && !args.paused,
        resume_mode,
        decoder: DecoderOptions {
            ffmpeg: config.media.ffmpeg.clone(),
            ffprobe: config.media.ffprobe.clone(),
            loop_video: config.media.loop_video,
        },
    }
}

fn media_reference(path: PathBuf, kind: Option<MediaKindArg>) -> Result<MediaReference> {
    ensure!(path.exists(), "media file {} does not exist", path.display());
    match kind {
        Some(kind) => Ok(MediaReference::new(kind.into(), path)),
        None => MediaReference::from_path(&path).ok_or_else(|| {
            anyhow!(
                "cannot tell whether {} is an image or a video; pass --kind",
                path.display()
            )
        }),
    }
}

fn report_event(event: &PreviewEvent, source: &str) {
    match event {
        PreviewEvent::Compiled(Ok(())) => tracing::info!("shader compiled"),
        PreviewEvent::Compiled(Err(diagnostic)) => {
            eprint!("{}", render_diagnostic(source, diagnostic));
        }
        PreviewEvent::DiagnosticCleared => tracing::info!("previous error resolved"),
        PreviewEvent::PlaybackChanged { playing } => {
            tracing::info!(playing = *playing, "playback toggled");
        }
        PreviewEvent::Failed(message) => tracing::error!(%message, "renderer error"),
        PreviewEvent::Closed => {}
    }
}
