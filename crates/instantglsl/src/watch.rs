use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};

/// Watches one shader file and yields its contents whenever they change.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by writing a new file and renaming it over the old one keep
/// triggering reloads.
pub struct ShaderWatcher {
    path: PathBuf,
    contents: String,
    changes: Receiver<()>,
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

impl ShaderWatcher {
    /// Reads the file once; the returned source is the initial program.
    pub fn open(path: impl AsRef<Path>, debounce: Duration) -> Result<(Self, String)> {
        let requested = path.as_ref();
        let contents = read_source(requested)?;
        let path = fs::canonicalize(requested)
            .with_context(|| format!("failed to resolve {}", requested.display()))?;
        let (directory, file_name) = match (path.parent(), path.file_name()) {
            (Some(directory), Some(name)) => (directory.to_path_buf(), name.to_os_string()),
            _ => return Err(anyhow!("{} is not a file", path.display())),
        };

        let (sender, changes) = crossbeam_channel::unbounded();
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            forward_changes(result, &file_name, &sender);
        })
        .context("failed to start file watcher")?;
        debouncer
            .watcher()
            .watch(&directory, notify::RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", directory.display()))?;
        tracing::debug!(path = %path.display(), ?debounce, "watching shader");

        let watcher = Self {
            path,
            contents: contents.clone(),
            changes,
            _debouncer: debouncer,
        };
        Ok((watcher, contents))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fires once per debounced burst of writes to the shader file.
    pub fn changes(&self) -> &Receiver<()> {
        &self.changes
    }

    /// Rereads the file after a change notification.
    ///
    /// Returns `None` when the contents are unchanged or the file is briefly
    /// missing mid-save; a later notification picks up the new file.
    pub fn reload(&mut self) -> Result<Option<String>> {
        while self.changes.try_recv().is_ok() {}
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = read_source(&self.path)?;
        if contents == self.contents {
            return Ok(None);
        }
        self.contents = contents.clone();
        Ok(Some(contents))
    }
}

fn forward_changes(result: DebounceEventResult, file_name: &OsString, sender: &Sender<()>) {
    match result {
        Ok(events) => {
            let touched = events.iter().any(|event| {
                event.kind == DebouncedEventKind::Any
                    && event.path.file_name() == Some(file_name.as_os_str())
            });
            if touched {
                let _ = sender.send(());
            }
        }
        Err(err) => tracing::warn!("file watcher error: {err}"),
    }
}

pub fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read shader {}", path.display()))
}
