//! Feed configuration persistence.
//!
//! Stores feed limits and the local identity as JSON at
//! `~/.local/share/clipfeed/config.json`. Missing fields fall back to their
//! defaults so older files keep loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::export::DEFAULT_FRAME_COUNT;
use crate::theme::Theme;

/// Default config file path.
fn default_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clipfeed")
        .join("config.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Maximum number of messages shown at once.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Evicted records kept for reuse; 0 disposes them immediately.
    #[serde(default)]
    pub max_recycled: usize,
    #[serde(default = "default_frame_count")]
    pub export_frame_count: u32,
    /// Local user id; messages from it never offer a mute action.
    #[serde(default)]
    pub self_id: String,
    #[serde(default)]
    pub theme: Theme,
    /// Where exported images are written by the CLI.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Path the config was loaded from (not serialized).
    #[serde(skip)]
    path: PathBuf,
}

fn default_capacity() -> usize { 30 }
fn default_frame_count() -> u32 { DEFAULT_FRAME_COUNT }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_recycled: 0,
            export_frame_count: default_frame_count(),
            self_id: String::new(),
            theme: Theme::default(),
            download_dir: None,
            path: default_path(),
        }
    }
}

impl FeedConfig {
    /// Load from the default location, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = default_path();
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.path = path;
        config
    }

    /// Load from an explicit path; errors are returned.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&contents)?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Persist current config to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
