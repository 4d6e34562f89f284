use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write settings {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// User preferences. Keys this version does not know about survive a rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_course: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Settings {
    /// An explicit id wins over the stored default. `None` means the caller
    /// has to ask the user.
    pub fn resolve_course(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.default_course
                    .clone()
                    .filter(|c| !c.trim().is_empty())
            })
    }
}

/// `settings.json`, read and written as a whole document.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or empty file yields empty settings.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|source| SettingsError::Read {
            path: self.path.clone(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let write_err = |source: std::io::Error| SettingsError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        std::fs::write(&self.path, json).map_err(write_err)?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Load, set the default course and persist immediately.
    pub fn set_default_course(&self, course_id: &str) -> Result<Settings, SettingsError> {
        let mut settings = self.load()?;
        settings.default_course = Some(course_id.to_string());
        self.save(&settings)?;
        info!(course_id, "Default course set");
        Ok(settings)
    }
}
