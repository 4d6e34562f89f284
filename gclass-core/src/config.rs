use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name under the platform config dir.
pub const APP_DIR_NAME: &str = "gclass-cli";

/// Environment variable that overrides the config directory.
pub const CONFIG_DIR_ENV: &str = "GCLASS_CONFIG_DIR";

pub const CLIENT_SECRET_FILE: &str = "credentials.json";
pub const TOKEN_FILE: &str = "token.json";
pub const SETTINGS_FILE: &str = "settings.json";

/// Locations of every file the CLI reads or writes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    /// OAuth client registration downloaded from the Google Cloud console.
    pub client_secret: PathBuf,
    /// Cached user credential.
    pub token: PathBuf,
    pub settings: PathBuf,
}

impl AppPaths {
    pub fn in_dir<P: AsRef<Path>>(config_dir: P) -> Self {
        let config_dir = config_dir.as_ref().to_path_buf();
        Self {
            client_secret: config_dir.join(CLIENT_SECRET_FILE),
            token: config_dir.join(TOKEN_FILE),
            settings: config_dir.join(SETTINGS_FILE),
            config_dir,
        }
    }

    /// `$GCLASS_CONFIG_DIR` if set and non-empty, else `<platform config dir>/gclass-cli`.
    /// Falls back to `./.gclass-cli` on platforms without a config dir.
    pub fn from_env() -> Self {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .map(|d| d.join(APP_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR_NAME}"))),
        };
        Self::in_dir(dir)
    }

    /// Creates the config directory if it does not exist yet.
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
            debug!(path = %self.config_dir.display(), "Created config directory");
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            config_dir = %self.config_dir.display(),
            client_secret_present = self.client_secret.exists(),
            token_present = self.token.exists(),
            "Resolved config paths"
        );
    }
}
