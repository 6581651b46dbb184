//! Configuration System
//!
//! The orchestration core treats configuration persistence as a collaborator:
//! it sequences calls to [`ConfigStore`] but owns none of the mapping from
//! configuration values to rendering. A TOML-backed store and a `notify`
//! based file watcher are provided for hosts that want the default behavior.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ShellError;
use crate::logging::LoggingConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Show completion/status notifications.
    #[serde(default = "default_true")]
    pub show_notifications: bool,

    /// Re-apply configuration automatically when the file changes on disk.
    #[serde(default = "default_true")]
    pub watch_config_file: bool,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            show_notifications: true,
            watch_config_file: true,
            logging: LoggingConfig::default(),
        }
    }
}

/// Default configuration file location (`<config dir>/glassbar/config.toml`).
pub fn default_config_path() -> Result<PathBuf, ShellError> {
    let dirs = directories::ProjectDirs::from("", "", "glassbar")
        .ok_or_else(|| ShellError::Config("could not resolve a configuration directory".into()))?;
    Ok(dirs.config_dir().join("config.toml"))
}

/// Contract supplied by the configuration collaborator.
pub trait ConfigStore: Send + Sync {
    /// Current in-memory configuration.
    fn get_config(&self) -> ShellConfig;

    /// Persist the current configuration, creating the file if absent.
    fn save_config(&self) -> Result<(), ShellError>;

    /// Remove the persisted configuration file.
    fn delete_config_file(&self) -> Result<(), ShellError>;

    /// Open the configuration file in the user's editor.
    fn edit_config_file(&self) -> Result<(), ShellError>;
}

/// TOML-backed configuration store.
pub struct FileConfigStore {
    path: PathBuf,
    current: Mutex<ShellConfig>,
}

impl FileConfigStore {
    /// Open a store at `path`, loading the file if it exists and falling
    /// back to defaults otherwise.
    pub fn open(path: PathBuf) -> Result<Self, ShellError> {
        let current = if path.exists() {
            Self::load_file(&path)?
        } else {
            ShellConfig::default()
        };
        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the configuration file exists on disk. Drives the first-run
    /// decision at startup.
    pub fn file_exists(&self) -> bool {
        self.path.exists()
    }

    /// Re-read the file into memory (used after a watcher notification).
    pub fn reload(&self) -> Result<(), ShellError> {
        if self.path.exists() {
            *self.current.lock() = Self::load_file(&self.path)?;
            debug!(path = %self.path.display(), "configuration reloaded");
        }
        Ok(())
    }

    fn load_file(path: &Path) -> Result<ShellConfig, ShellError> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|error| ShellError::Config(format!("invalid configuration file: {error}")))
    }
}

impl ConfigStore for FileConfigStore {
    fn get_config(&self) -> ShellConfig {
        self.current.lock().clone()
    }

    fn save_config(&self) -> Result<(), ShellError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(&*self.current.lock())
            .map_err(|error| ShellError::Config(format!("could not render configuration: {error}")))?;
        std::fs::write(&self.path, rendered)?;
        info!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    fn delete_config_file(&self) -> Result<(), ShellError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "configuration file deleted");
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn edit_config_file(&self) -> Result<(), ShellError> {
        if !self.path.exists() {
            self.save_config()?;
        }
        let editor = std::env::var("VISUAL")
            .or_else(|_| std::env::var("EDITOR"))
            .unwrap_or_else(|_| "xdg-open".to_string());
        std::process::Command::new(editor).arg(&self.path).spawn()?;
        Ok(())
    }
}

/// Watches the configuration file and invokes the change callback when it is
/// created, modified or removed on disk.
///
/// The callback runs on the watcher's own thread; wire it to a main-context
/// dispatch when it needs to touch shared state.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn spawn(
        path: PathBuf,
        on_change: impl Fn() + Send + 'static,
    ) -> Result<Self, ShellError> {
        let watch_dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ShellError::Config("configuration path has no parent".into()))?;

        let target = path.clone();
        let mut watcher =
            notify::recommended_watcher(move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if is_config_change(&event, &target) {
                        debug!(path = %target.display(), "configuration file changed on disk");
                        on_change();
                    }
                }
                Err(error) => warn!(%error, "configuration watcher error"),
            })
            .map_err(|error| {
                ShellError::Config(format!("could not create configuration watcher: {error}"))
            })?;

        // Watch the parent directory so the file reappearing after a delete
        // is still observed.
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|error| {
                ShellError::Config(format!("could not watch configuration directory: {error}"))
            })?;

        debug!(path = %path.display(), "configuration watcher running");
        Ok(Self { _watcher: watcher })
    }
}

fn is_config_change(event: &Event, target: &Path) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    relevant_kind && event.paths.iter().any(|path| path == target)
}

/// Convenience wrapper: an `Arc`'d store shared between the composition root
/// and the onboarding flow.
pub type SharedConfigStore = Arc<dyn ConfigStore>;
