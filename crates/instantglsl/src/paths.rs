use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

/// Overrides the platform config directory when set to a non-empty path.
pub const ENV_CONFIG_DIR: &str = "INSTANTGLSL_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let config_dir = match env::var_os(ENV_CONFIG_DIR).filter(|value| !value.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("org", "InstantGLSL", "instantglsl")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or_else(|| anyhow!("no home directory to place configuration in"))?,
        };
        Ok(Self { config_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}

impl AsRef<Path> for AppPaths {
    fn as_ref(&self) -> &Path {
        &self.config_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV: Mutex<()> = Mutex::new(());

    fn with_config_dir<R>(value: &OsStr, body: impl FnOnce() -> R) -> R {
        let _lock = ENV.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let saved = env::var_os(ENV_CONFIG_DIR);
        env::set_var(ENV_CONFIG_DIR, value);
        let result = body();
        match saved {
            Some(saved) => env::set_var(ENV_CONFIG_DIR, saved),
            None => env::remove_var(ENV_CONFIG_DIR),
        }
        result
    }

    #[test]
    fn override_directory_wins() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("settings");

        let paths = with_config_dir(dir.as_os_str(), AppPaths::discover).unwrap();
        assert_eq!(paths.as_ref(), dir.as_path());
        assert_eq!(paths.config_file(), dir.join("config.toml"));
    }

    #[test]
    fn blank_override_falls_through() {
        let discovered = with_config_dir(OsStr::new(""), AppPaths::discover);
        if let Ok(paths) = discovered {
            assert!(paths.config_file().ends_with("config.toml"));
            assert_ne!(paths.as_ref(), Path::new(""));
        }
    }
}
