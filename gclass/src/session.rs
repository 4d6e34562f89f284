//! Per-invocation context shared by the command handlers: configuration, the
//! HTTP client, the browser switch, the settings store and sign-in.

use anyhow::{bail, Context, Result};
use gclass_core::credential::{Credential, CredentialManager};
use gclass_core::settings::SettingsStore;
use reqwest::Client;

use crate::classroom::ClassroomClient;
use crate::console::{self, Browser};
use crate::drive::DriveClient;
use crate::http::build_http_client;
use crate::load_config::CliConfig;
use crate::oauth::GoogleAuthFlow;

pub struct Session {
    pub config: CliConfig,
    pub browser: Browser,
    http: Client,
    settings: SettingsStore,
}

impl Session {
    pub fn new(config: CliConfig, browser: Browser) -> Result<Self> {
        let http = build_http_client(config.http_timeout).context("Failed to build HTTP client")?;
        let settings = SettingsStore::new(&config.paths.settings);
        Ok(Self {
            config,
            browser,
            http,
            settings,
        })
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn credentials(&self) -> CredentialManager<GoogleAuthFlow<Browser>> {
        let flow = GoogleAuthFlow::new(self.http.clone(), self.browser).open_browser(self.browser.enabled);
        CredentialManager::new(&self.config.paths, flow)
    }

    pub async fn sign_in(&self) -> Result<Credential> {
        let credential = self.credentials().acquire().await?;
        Ok(credential)
    }

    pub fn classroom(&self, credential: &Credential) -> ClassroomClient {
        ClassroomClient::new(
            self.http.clone(),
            self.config.classroom_url.clone(),
            credential.access_token.clone(),
        )
    }

    pub fn drive(&self, credential: &Credential) -> DriveClient {
        DriveClient::new(
            self.http.clone(),
            self.config.drive_upload_url.clone(),
            credential.access_token.clone(),
        )
        .with_chunk_size(self.config.chunk_size)
    }

    /// The `--course` flag, else the stored default, else ask.
    pub fn resolve_course(&self, explicit: Option<&str>) -> Result<String> {
        let settings = self.settings.load()?;
        if let Some(course) = settings.resolve_course(explicit) {
            return Ok(course);
        }
        let entered = console::prompt_course_id().context("Failed to read course ID")?;
        if entered.is_empty() {
            bail!("A course ID is required");
        }
        Ok(entered)
    }
}
