use chrono::{Duration, Utc};
use gclass_core::config::AppPaths;
use gclass_core::credential::{
    required_scopes, AuthError, Credential, CredentialManager, MockAuthFlow, TokenFile,
    DEFAULT_TOKEN_URI,
};
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn credential(access: &str, refresh: Option<&str>, expires_in: Option<Duration>) -> Credential {
    Credential {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        token_uri: DEFAULT_TOKEN_URI.to_string(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        scopes: required_scopes(),
        expiry: expires_in.map(|d| Utc::now() + d),
    }
}

fn workspace(with_client_secret: bool) -> (TempDir, AppPaths) {
    let dir = tempdir().expect("temp dir");
    let paths = AppPaths::in_dir(dir.path());
    if with_client_secret {
        std::fs::write(
            &paths.client_secret,
            r#"{"installed":{"client_id":"client-id","client_secret":"client-secret"}}"#,
        )
        .unwrap();
    }
    (dir, paths)
}

fn seed_token(path: &Path, cred: &Credential) {
    TokenFile::new(path).save(cred).expect("seed token");
}

fn stored(paths: &AppPaths) -> Credential {
    TokenFile::new(&paths.token)
        .load()
        .expect("credential should have been persisted")
}

#[tokio::test]
async fn absent_credential_without_client_config_is_missing_client_config() {
    let (_dir, paths) = workspace(false);
    let flow = MockAuthFlow::new();
    let manager = CredentialManager::new(&paths, flow);

    let err = manager.acquire().await.unwrap_err();
    match err {
        AuthError::MissingClientConfig { path } => assert_eq!(path, paths.client_secret),
        other => panic!("expected MissingClientConfig, got {other:?}"),
    }
    assert!(!paths.token.exists());
}

#[tokio::test]
async fn absent_credential_runs_consent_once_then_uses_cache() {
    let (_dir, paths) = workspace(true);
    let mut flow = MockAuthFlow::new();
    flow.expect_authorize()
        .times(1)
        .withf(|client, scopes| client.client_id == "client-id" && scopes == required_scopes().as_slice())
        .returning(|_, _| Ok(credential("fresh", Some("refresh"), Some(Duration::hours(1)))));
    flow.expect_refresh().times(0);
    let manager = CredentialManager::new(&paths, flow);

    let first = manager.acquire().await.expect("first acquire");
    assert_eq!(first.access_token, "fresh");
    assert_eq!(stored(&paths).access_token, "fresh");

    // Served from the token file; the mock would panic on a second authorize.
    let second = manager.acquire().await.expect("second acquire");
    assert_eq!(second.access_token, "fresh");
}

#[tokio::test]
async fn absent_credential_when_non_interactive_requires_interactive_auth() {
    let (_dir, paths) = workspace(true);
    let manager = CredentialManager::new(&paths, MockAuthFlow::new()).interactive(false);

    let err = manager.acquire().await.unwrap_err();
    assert!(matches!(err, AuthError::InteractiveAuthRequired));
}

#[tokio::test]
async fn valid_credential_makes_no_calls() {
    let (_dir, paths) = workspace(false);
    seed_token(&paths.token, &credential("cached", None, Some(Duration::hours(1))));
    let manager = CredentialManager::new(&paths, MockAuthFlow::new());

    for _ in 0..2 {
        let cred = manager.acquire().await.expect("cached credential");
        assert_eq!(cred.access_token, "cached");
    }
}

#[tokio::test]
async fn expired_credential_with_refresh_token_is_refreshed_and_persisted() {
    let (_dir, paths) = workspace(false);
    seed_token(
        &paths.token,
        &credential("stale", Some("refresh"), Some(-Duration::minutes(5))),
    );
    let mut flow = MockAuthFlow::new();
    flow.expect_refresh()
        .times(1)
        .withf(|cred| cred.refresh_token.as_deref() == Some("refresh"))
        .returning(|_| {
            let mut cred = credential("renewed", None, Some(Duration::hours(1)));
            cred.scopes.clear();
            Ok(cred)
        });
    flow.expect_authorize().times(0);
    let manager = CredentialManager::new(&paths, flow);

    let cred = manager.acquire().await.expect("refreshed");
    assert_eq!(cred.access_token, "renewed");
    assert_eq!(cred.refresh_token.as_deref(), Some("refresh"));
    assert_eq!(cred.scopes, required_scopes());

    let on_disk = stored(&paths);
    assert_eq!(on_disk.access_token, "renewed");
    assert_eq!(on_disk.refresh_token.as_deref(), Some("refresh"));
}

#[tokio::test]
async fn failed_refresh_falls_back_to_consent() {
    let (_dir, paths) = workspace(true);
    seed_token(
        &paths.token,
        &credential("stale", Some("revoked"), Some(-Duration::minutes(5))),
    );
    let mut flow = MockAuthFlow::new();
    flow.expect_refresh()
        .times(1)
        .returning(|_| Err(AuthError::RefreshFailed("invalid_grant".into())));
    flow.expect_authorize()
        .times(1)
        .returning(|_, _| Ok(credential("consented", Some("new-refresh"), Some(Duration::hours(1)))));
    let manager = CredentialManager::new(&paths, flow);

    let cred = manager.acquire().await.expect("consent after failed refresh");
    assert_eq!(cred.access_token, "consented");
    assert_eq!(stored(&paths).refresh_token.as_deref(), Some("new-refresh"));
}

#[tokio::test]
async fn failed_refresh_without_client_config_is_missing_client_config() {
    let (_dir, paths) = workspace(false);
    seed_token(
        &paths.token,
        &credential("stale", Some("revoked"), Some(-Duration::minutes(5))),
    );
    let mut flow = MockAuthFlow::new();
    flow.expect_refresh()
        .times(1)
        .returning(|_| Err(AuthError::RefreshFailed("invalid_grant".into())));
    let manager = CredentialManager::new(&paths, flow);

    let err = manager.acquire().await.unwrap_err();
    assert!(matches!(err, AuthError::MissingClientConfig { .. }));
}

#[tokio::test]
async fn expired_credential_without_refresh_token_runs_consent() {
    let (_dir, paths) = workspace(true);
    seed_token(&paths.token, &credential("stale", None, Some(-Duration::minutes(5))));
    let mut flow = MockAuthFlow::new();
    flow.expect_refresh().times(0);
    flow.expect_authorize()
        .times(1)
        .returning(|_, _| Ok(credential("consented", Some("r"), Some(Duration::hours(1)))));
    let manager = CredentialManager::new(&paths, flow);

    let cred = manager.acquire().await.expect("consent");
    assert_eq!(cred.access_token, "consented");
    assert_eq!(stored(&paths).access_token, "consented");
}

#[tokio::test]
async fn malformed_token_file_is_treated_as_absent() {
    let (_dir, paths) = workspace(true);
    std::fs::write(&paths.token, "{ this is not json").unwrap();
    let mut flow = MockAuthFlow::new();
    flow.expect_authorize()
        .times(1)
        .returning(|_, _| Ok(credential("consented", None, None)));
    let manager = CredentialManager::new(&paths, flow);

    let cred = manager.acquire().await.expect("consent replaces malformed file");
    assert_eq!(cred.access_token, "consented");
    assert_eq!(stored(&paths).access_token, "consented");
}

#[tokio::test]
async fn credential_missing_a_scope_is_reauthorized() {
    let (_dir, paths) = workspace(true);
    let mut narrow = credential("narrow", Some("r"), Some(Duration::hours(1)));
    narrow.scopes.retain(|s| !s.ends_with("drive.file"));
    seed_token(&paths.token, &narrow);
    let mut flow = MockAuthFlow::new();
    flow.expect_refresh().times(0);
    flow.expect_authorize()
        .times(1)
        .returning(|_, _| Ok(credential("wide", Some("r"), Some(Duration::hours(1)))));
    let manager = CredentialManager::new(&paths, flow);

    let cred = manager.acquire().await.expect("re-consent");
    assert!(cred.has_scopes(&required_scopes()));
}

#[tokio::test]
async fn failed_consent_is_fatal_and_persists_nothing() {
    let (_dir, paths) = workspace(true);
    let mut flow = MockAuthFlow::new();
    flow.expect_authorize()
        .times(1)
        .returning(|_, _| Err(AuthError::Authorization("access_denied".into())));
    let manager = CredentialManager::new(&paths, flow);

    let err = manager.acquire().await.unwrap_err();
    assert!(matches!(err, AuthError::Authorization(_)));
    assert!(!paths.token.exists());
}
