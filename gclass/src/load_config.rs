/// `load_config` module: resolves where gclass keeps its files and which
/// endpoints it talks to.
///
/// Everything comes from the environment (a `.env` file is loaded by `main`);
/// there is no config file of its own. The config directory holds the OAuth
/// client registration, the cached token and the settings document.
///
/// # Environment
/// - `GCLASS_CONFIG_DIR`: config directory (default `<platform config dir>/gclass-cli`)
/// - `GCLASS_CLASSROOM_URL`: Classroom API base URL
/// - `GCLASS_DRIVE_UPLOAD_URL`: Drive upload endpoint
/// - `GCLASS_UPLOAD_CHUNK_SIZE`: bytes per upload chunk, rounded down to a 256 KiB multiple
use anyhow::{Context, Result};
use gclass_core::config::AppPaths;
use std::time::Duration;
use tracing::{info, warn};

use crate::classroom::DEFAULT_CLASSROOM_URL;
use crate::drive::{align_chunk_size, DEFAULT_CHUNK_SIZE, DEFAULT_DRIVE_UPLOAD_URL};

pub const CLASSROOM_URL_ENV: &str = "GCLASS_CLASSROOM_URL";
pub const DRIVE_UPLOAD_URL_ENV: &str = "GCLASS_DRIVE_UPLOAD_URL";
pub const CHUNK_SIZE_ENV: &str = "GCLASS_UPLOAD_CHUNK_SIZE";

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub paths: AppPaths,
    pub classroom_url: String,
    pub drive_upload_url: String,
    pub chunk_size: usize,
    pub http_timeout: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().trim_end_matches('/').to_string(),
        _ => default.to_string(),
    }
}

pub fn load_config() -> Result<CliConfig> {
    let paths = AppPaths::from_env();
    paths
        .ensure_dir()
        .with_context(|| format!("Failed to create config directory {}", paths.config_dir.display()))?;
    paths.trace_loaded();

    let chunk_size = match std::env::var(CHUNK_SIZE_ENV) {
        Ok(raw) => {
            let requested: usize = raw
                .trim()
                .parse()
                .with_context(|| format!("{CHUNK_SIZE_ENV} must be a number of bytes, got {raw:?}"))?;
            let aligned = align_chunk_size(requested);
            if aligned != requested {
                warn!(requested, aligned, "Upload chunk size rounded to a 256 KiB multiple");
            }
            aligned
        }
        Err(_) => DEFAULT_CHUNK_SIZE,
    };

    let config = CliConfig {
        paths,
        classroom_url: env_or(CLASSROOM_URL_ENV, DEFAULT_CLASSROOM_URL),
        drive_upload_url: env_or(DRIVE_UPLOAD_URL_ENV, DEFAULT_DRIVE_UPLOAD_URL),
        chunk_size,
        http_timeout: HTTP_TIMEOUT,
    };
    info!(
        classroom_url = %config.classroom_url,
        drive_upload_url = %config.drive_upload_url,
        chunk_size = config.chunk_size,
        "Configuration loaded"
    );
    Ok(config)
}
