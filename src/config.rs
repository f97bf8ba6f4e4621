use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// User preferences persisted in `prefs.toml`. CLI flags take precedence.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  /// `mv` or `narration`; updated whenever the mode is switched.
  pub playback_mode: Option<String>,
  /// `espeak-ng`, `say`, `none` or `auto`.
  pub speech_engine: Option<String>,
  /// `auto`, `truecolor` or `256`.
  pub color: Option<String>,
}

impl Config {
  /// `<config dir>/prefs.toml`, if a home directory exists.
  pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "glyphreel").map(|dirs| dirs.config_dir().join("prefs.toml"))
  }

  pub fn load() -> Self {
    Self::default_path().map(|p| Self::load_from(&p)).unwrap_or_default()
  }

  pub fn load_from(path: &Path) -> Self {
    let Ok(content) = std::fs::read_to_string(path) else {
      debug!(path = %path.display(), "config: no preferences file");
      return Self::default();
    };
    match toml::from_str(&content) {
      Ok(config) => config,
      Err(e) => {
        warn!(path = %path.display(), err = %e, "config: ignoring malformed preferences");
        Self::default()
      }
    }
  }

  pub fn save_to(&self, path: &Path) {
    if let Some(dir) = path.parent()
      && let Err(e) = std::fs::create_dir_all(dir)
    {
      warn!(dir = %dir.display(), err = %e, "config: cannot create config directory");
      return;
    }
    match toml::to_string(self) {
      Ok(content) => {
        if let Err(e) = std::fs::write(path, content) {
          warn!(path = %path.display(), err = %e, "config: failed to save preferences");
        }
      }
      Err(e) => warn!(err = %e, "config: failed to serialise preferences"),
    }
  }
}
