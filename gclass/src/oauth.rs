//! Installed-app OAuth against Google's authorization server.
//!
//! [`GoogleAuthFlow`] implements the core `AuthFlow` trait:
//!
//! - `authorize` runs the loopback flow: a one-shot listener on
//!   `127.0.0.1:<ephemeral>`, a consent URL carrying a PKCE challenge and a
//!   random `state`, then the authorization-code exchange.
//! - `refresh` trades the stored refresh token for a new access token.
//!
//! Both token calls go to the `token_uri` named by the client registration or
//! the stored credential, which is also how the tests point them at a local server.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration as ChronoDuration, Utc};
use gclass_core::contract::{ApiError, LinkOpener};
use gclass_core::credential::{AuthError, AuthFlow, ClientSecret, Credential};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_CONSENT_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_REQUEST_BYTES: usize = 16 * 1024;
const SUCCESS_PAGE: &str = "The authentication flow has completed. You may close this window.";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, client_id: &str, client_secret: &str, token_uri: &str) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_uri: token_uri.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        }
    }
}

/// What the browser sent back to the loopback listener.
#[derive(Debug, PartialEq)]
pub(crate) enum Callback {
    Code(String),
    /// A request that is not the redirect (e.g. `/favicon.ico`).
    Unrelated,
}

pub struct GoogleAuthFlow<O> {
    http: Client,
    opener: O,
    open_browser: bool,
    timeout: Duration,
}

impl<O: LinkOpener> GoogleAuthFlow<O> {
    pub fn new(http: Client, opener: O) -> Self {
        Self {
            http,
            opener,
            open_browser: true,
            timeout: DEFAULT_CONSENT_TIMEOUT,
        }
    }

    pub fn open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exchange_code(
        &self,
        client: &ClientSecret,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> Result<Credential, AuthError> {
        let resp = self
            .http
            .post(&client.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("code_verifier", verifier),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Authorization(e.to_string()))?;
        let token = token_response(resp).await.map_err(AuthError::Authorization)?;
        Ok(token.into_credential(&client.client_id, &client.client_secret, &client.token_uri))
    }
}

async fn token_response(resp: reqwest::Response) -> Result<TokenResponse, String> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        return Err(ApiError::from_response(status.as_u16(), &body).to_string());
    }
    serde_json::from_str(&body).map_err(|e| format!("unexpected token response: {e}"))
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub(crate) fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub(crate) fn consent_url(
    client: &ClientSecret,
    scopes: &[String],
    redirect_uri: &str,
    state: &str,
    challenge: &str,
) -> Result<Url, AuthError> {
    let scope = scopes.join(" ");
    Url::parse_with_params(
        &client.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| AuthError::Authorization(format!("invalid auth_uri {:?}: {e}", client.auth_uri)))
}

/// Interprets the request target of a loopback request.
pub(crate) fn parse_callback(target: &str, expected_state: &str) -> Result<Callback, AuthError> {
    let url = Url::parse("http://127.0.0.1")
        .and_then(|base| base.join(target))
        .map_err(|e| AuthError::Authorization(format!("malformed redirect: {e}")))?;
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }
    if let Some(error) = error {
        return Err(AuthError::Authorization(format!("consent was not granted: {error}")));
    }
    let Some(code) = code else {
        return Ok(Callback::Unrelated);
    };
    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::Authorization("state mismatch in redirect".into()));
    }
    Ok(Callback::Code(code))
}

async fn read_request_target(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() < MAX_REQUEST_BYTES {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    Ok(target)
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "[AUTH] Could not answer loopback request");
    }
    let _ = stream.shutdown().await;
}

async fn wait_for_code(listener: &TcpListener, state: &str) -> Result<String, AuthError> {
    loop {
        let (mut stream, peer) = listener
            .accept()
            .await
            .map_err(|e| AuthError::Authorization(format!("loopback listener failed: {e}")))?;
        let target = match read_request_target(&mut stream).await {
            Ok(target) => target,
            Err(e) => {
                debug!(error = %e, %peer, "[AUTH] Dropped unreadable loopback request");
                continue;
            }
        };
        match parse_callback(&target, state) {
            Ok(Callback::Code(code)) => {
                respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                return Ok(code);
            }
            Ok(Callback::Unrelated) => respond(&mut stream, "404 Not Found", "").await,
            Err(e) => {
                respond(&mut stream, "400 Bad Request", &e.to_string()).await;
                return Err(e);
            }
        }
    }
}

#[async_trait]
impl<O: LinkOpener> AuthFlow for GoogleAuthFlow<O> {
    async fn authorize(
        &self,
        client: &ClientSecret,
        scopes: &[String],
    ) -> Result<Credential, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| AuthError::Authorization(format!("cannot bind loopback port: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Authorization(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}/");
        let verifier = random_string(64);
        let state = random_string(32);
        let url = consent_url(client, scopes, &redirect_uri, &state, &pkce_challenge(&verifier))?;

        eprintln!("Please visit this URL to authorize this application:\n{url}");
        if self.open_browser {
            if let Err(e) = self.opener.open(url.as_str()) {
                warn!(error = %e, "[AUTH] Could not open browser");
            }
        }
        info!(port, "[AUTH] Waiting for consent redirect");

        let code = tokio::time::timeout(self.timeout, wait_for_code(&listener, &state))
            .await
            .map_err(|_| AuthError::Authorization("timed out waiting for consent".into()))??;
        debug!("[AUTH] Received authorization code");
        self.exchange_code(client, &code, &redirect_uri, &verifier).await
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::RefreshFailed("no refresh token".into()))?;
        let resp = self
            .http
            .post(&credential.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", credential.client_id.as_str()),
                ("client_secret", credential.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;
        let token = token_response(resp).await.map_err(AuthError::RefreshFailed)?;
        Ok(token.into_credential(
            &credential.client_id,
            &credential.client_secret,
            &credential.token_uri,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientSecret {
        ClientSecret {
            client_id: "cid.apps.googleusercontent.com".into(),
            client_secret: "shh".into(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".into(),
            token_uri: "https://oauth2.googleapis.com/token".into(),
            redirect_uris: vec!["http://localhost".into()],
        }
    }

    #[test]
    fn pkce_challenge_matches_rfc_7636_example() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn consent_url_requests_offline_access_with_pkce() {
        let scopes = vec!["a".to_string(), "b".to_string()];
        let url = consent_url(&client(), &scopes, "http://127.0.0.1:9/", "st", "ch").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("scope"), Some("a b"));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("code_challenge_method"), Some("S256"));
        assert_eq!(get("redirect_uri"), Some("http://127.0.0.1:9/"));
        assert_eq!(get("state"), Some("st"));
    }

    #[test]
    fn callback_parsing() {
        assert_eq!(
            parse_callback("/?state=xyz&code=4%2Fabc", "xyz").unwrap(),
            Callback::Code("4/abc".into())
        );
        assert_eq!(parse_callback("/favicon.ico", "xyz").unwrap(), Callback::Unrelated);
        assert!(parse_callback("/?code=c&state=other", "xyz").is_err());
        assert!(parse_callback("/?error=access_denied&state=xyz", "xyz").is_err());
    }
}
