//! Credential lifecycle: load the cached user credential, refresh it when it has
//! expired, and fall back to an interactive consent flow when nothing usable is
//! cached. Every newly obtained credential is written back before it is returned.
//!
//! The network-facing parts (consent and the refresh-token exchange) sit behind
//! [`AuthFlow`] so [`CredentialManager::acquire`] can be exercised with mocks.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::AppPaths;

/// Scopes requested on every consent. A cached credential missing any of
/// them is treated as unusable.
pub const SCOPES: [&str; 5] = [
    "https://www.googleapis.com/auth/classroom.courses",
    "https://www.googleapis.com/auth/classroom.coursework.me",
    "https://www.googleapis.com/auth/classroom.coursework.students",
    "https://www.googleapis.com/auth/classroom.rosters",
    "https://www.googleapis.com/auth/drive.file",
];

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are already considered expired.
const EXPIRY_SKEW_SECS: i64 = 60;

pub fn required_scopes() -> Vec<String> {
    SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credentials.json at:\n{}", .path.display())]
    MissingClientConfig { path: PathBuf },
    #[error("invalid client configuration in {}: {reason}", .path.display())]
    InvalidClientConfig { path: PathBuf, reason: String },
    #[error("interactive sign-in required; run `gclass auth` first")]
    InteractiveAuthRequired,
    #[error("refresh token exchange failed: {0}")]
    RefreshFailed(String),
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("could not write credential to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A user credential in Google's "authorized user" JSON layout, so token files
/// written by other Google tooling load as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    /// A credential without an expiry never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.scopes.iter().any(|g| g == s))
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>, required: &[String]) -> bool {
        !self.access_token.is_empty() && !self.is_expired_at(now) && self.has_scopes(required)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// OAuth client registration (`credentials.json` from the Cloud console).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Reads an "installed" or "web" client file.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Err(AuthError::MissingClientConfig {
                path: path.to_path_buf(),
            });
        }
        let invalid = |reason: String| AuthError::InvalidClientConfig {
            path: path.to_path_buf(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let file: ClientSecretFile =
            serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| invalid("expected an \"installed\" or \"web\" client".to_string()))
    }
}

/// The consent flow and refresh exchange, implemented against a real OAuth
/// server by the CLI and mocked in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait AuthFlow: Send + Sync {
    /// Runs interactive consent for `scopes` and exchanges the result for a credential.
    async fn authorize(
        &self,
        client: &ClientSecret,
        scopes: &[String],
    ) -> Result<Credential, AuthError>;

    /// Exchanges the credential's refresh token for a new access token.
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError>;
}

/// The persisted credential document.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when the file is absent, unreadable or not a credential.
    pub fn load(&self) -> Option<Credential> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "[AUTH] No cached credential");
            return None;
        }
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = ?e, path = %self.path.display(), "[AUTH] Could not read cached credential");
                return None;
            }
        };
        match serde_json::from_str::<Credential>(&raw) {
            Ok(cred) => Some(cred),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "[AUTH] Ignoring malformed cached credential");
                None
            }
        }
    }

    pub fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let persist = |source: std::io::Error| AuthError::Persist {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(persist)?;
        }
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| persist(std::io::Error::other(e)))?;
        std::fs::write(&self.path, json).map_err(persist)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(persist)?;
        }
        debug!(path = %self.path.display(), "[AUTH] Credential persisted");
        Ok(())
    }
}

/// Owns acquisition, caching and refresh of the user credential.
pub struct CredentialManager<F> {
    token_file: TokenFile,
    client_secret_path: PathBuf,
    flow: F,
    scopes: Vec<String>,
    interactive: bool,
}

impl<F: AuthFlow> CredentialManager<F> {
    pub fn new(paths: &AppPaths, flow: F) -> Self {
        Self {
            token_file: TokenFile::new(&paths.token),
            client_secret_path: paths.client_secret.clone(),
            flow,
            scopes: required_scopes(),
            interactive: true,
        }
    }

    /// With `false`, [`acquire`](Self::acquire) fails with
    /// [`AuthError::InteractiveAuthRequired`] instead of starting consent.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn token_file(&self) -> &TokenFile {
        &self.token_file
    }

    pub async fn acquire(&self) -> Result<Credential, AuthError> {
        let cached = self.token_file.load();

        if let Some(cred) = cached {
            let now = Utc::now();
            if cred.is_valid_at(now, &self.scopes) {
                debug!("[AUTH] Using cached credential");
                return Ok(cred);
            }
            if !cred.has_scopes(&self.scopes) {
                info!("[AUTH] Cached credential lacks required scopes, re-authorizing");
            } else if cred.is_expired_at(now) && cred.can_refresh() {
                match self.flow.refresh(&cred).await {
                    Ok(mut refreshed) => {
                        if refreshed.refresh_token.is_none() {
                            refreshed.refresh_token = cred.refresh_token.clone();
                        }
                        if refreshed.scopes.is_empty() {
                            refreshed.scopes = cred.scopes.clone();
                        }
                        self.token_file.save(&refreshed)?;
                        info!("[AUTH] Refreshed access token");
                        return Ok(refreshed);
                    }
                    Err(e) => {
                        warn!(error = %e, "[AUTH] Refresh failed, falling back to interactive sign-in");
                    }
                }
            } else {
                info!("[AUTH] Cached credential expired and cannot be refreshed");
            }
        }

        let client = ClientSecret::load(&self.client_secret_path)?;
        if !self.interactive {
            return Err(AuthError::InteractiveAuthRequired);
        }
        info!(client_id = %client.client_id, "[AUTH] Starting interactive authorization");
        let mut cred = self.flow.authorize(&client, &self.scopes).await?;
        if cred.scopes.is_empty() {
            cred.scopes = self.scopes.clone();
        }
        self.token_file.save(&cred)?;
        info!("[AUTH] Signed in");
        Ok(cred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(expiry: Option<DateTime<Utc>>) -> Credential {
        Credential {
            access_token: "at".into(),
            refresh_token: None,
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "cid".into(),
            client_secret: "secret".into(),
            scopes: required_scopes(),
            expiry,
        }
    }

    #[test]
    fn expiry_respects_clock_skew() {
        let now = Utc::now();
        assert!(!cred(None).is_expired_at(now));
        assert!(!cred(Some(now + Duration::hours(1))).is_expired_at(now));
        assert!(cred(Some(now + Duration::seconds(30))).is_expired_at(now));
        assert!(cred(Some(now - Duration::seconds(1))).is_expired_at(now));
    }

    #[test]
    fn missing_scope_makes_credential_invalid() {
        let mut c = cred(None);
        c.scopes.pop();
        assert!(!c.is_valid_at(Utc::now(), &required_scopes()));
    }

    #[test]
    fn loads_google_authorized_user_document() {
        let raw = r#"{"token":"ya29.x","refresh_token":"1//r","token_uri":"https://oauth2.googleapis.com/token",
            "client_id":"cid","client_secret":"cs","scopes":["a","b"],"universe_domain":"googleapis.com",
            "expiry":"2030-01-01T10:00:00.123456Z"}"#;
        let c: Credential = serde_json::from_str(raw).unwrap();
        assert_eq!(c.access_token, "ya29.x");
        assert!(c.can_refresh());
        assert_eq!(c.scopes, vec!["a".to_string(), "b".to_string()]);
        assert!(c.expiry.is_some());
    }

    #[test]
    fn client_secret_accepts_installed_and_web_layouts() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("credentials.json");

        std::fs::write(&path, r#"{"installed":{"client_id":"a","client_secret":"b"}}"#).unwrap();
        let installed = ClientSecret::load(&path).unwrap();
        assert_eq!(installed.client_id, "a");
        assert_eq!(installed.token_uri, DEFAULT_TOKEN_URI);

        std::fs::write(&path, r#"{"web":{"client_id":"w","token_uri":"http://t"}}"#).unwrap();
        let web = ClientSecret::load(&path).unwrap();
        assert_eq!(web.token_uri, "http://t");

        std::fs::write(&path, r#"{"other":{}}"#).unwrap();
        assert!(matches!(
            ClientSecret::load(&path),
            Err(AuthError::InvalidClientConfig { .. })
        ));
    }

    #[test]
    fn missing_client_secret_names_the_path() {
        let err = ClientSecret::load(Path::new("/nowhere/credentials.json")).unwrap_err();
        assert!(err.to_string().contains("/nowhere/credentials.json"));
    }
}
