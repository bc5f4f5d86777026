//! CLI settings.
//!
//! Read from `~/.config/forge-tools/settings.json`:
//!
//! ```json
//! {
//!   "environments": [{ "title": "local", "storage_root": "/srv/forge" }],
//!   "data": { "upload_chunk_size": 2097152, "delete_batch_size": 8 }
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use forge_upload::UploaderConfig;
use serde::{Deserialize, Serialize};

/// A named storage target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub title: String,
    pub storage_root: PathBuf,
}

/// Data management tunables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub data: DataSettings,
}

impl Settings {
    /// Loads settings from `path`, or from the default location.
    ///
    /// A missing file yields defaults. A file that fails to parse is
    /// logged and ignored.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match settings_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        match serde_json::from_str(&content) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "failed to parse settings, using defaults: {e}"
                );
                Ok(Self::default())
            }
        }
    }

    /// Picks the environment named `title`, or the first configured one.
    ///
    /// With no environments configured, falls back to a `local` environment
    /// under the config directory.
    pub fn environment(&self, title: Option<&str>) -> anyhow::Result<Environment> {
        match title {
            Some(title) => match self.environments.iter().find(|e| e.title == title) {
                Some(env) => Ok(env.clone()),
                None => bail!(
                    "unknown environment {title:?} (configured: {})",
                    self.environment_titles().join(", ")
                ),
            },
            None => match self.environments.first() {
                Some(env) => Ok(env.clone()),
                None => default_environment(),
            },
        }
    }

    pub fn environment_titles(&self) -> Vec<&str> {
        self.environments.iter().map(|e| e.title.as_str()).collect()
    }

    pub fn uploader_config(&self) -> UploaderConfig {
        let mut config = UploaderConfig::default()
            .with_default_content_type(self.data.default_content_type.clone());
        if let Some(size) = self.data.upload_chunk_size {
            config = config.with_chunk_size(size);
        }
        if let Some(size) = self.data.delete_batch_size {
            config = config.with_delete_batch_size(size);
        }
        config
    }
}

fn settings_path() -> Option<PathBuf> {
    forge_session_store::config_dir().map(|d| d.join("forge-tools").join("settings.json"))
}

fn default_environment() -> anyhow::Result<Environment> {
    let dir = forge_session_store::config_dir()
        .context("cannot determine config directory, pass --config with an environment")?;
    Ok(Environment {
        title: "local".into(),
        storage_root: dir.join("forge-tools").join("storage"),
    })
}
