use gclass::drive::{CHUNK_ALIGN, DEFAULT_CHUNK_SIZE};
use gclass::load_config::{load_config, CHUNK_SIZE_ENV, CLASSROOM_URL_ENV, DRIVE_UPLOAD_URL_ENV};
use gclass_core::config::CONFIG_DIR_ENV;
use serial_test::serial;
use std::env;
use std::time::Duration;
use tempfile::TempDir;

fn clear_overrides() {
    for key in [CLASSROOM_URL_ENV, DRIVE_UPLOAD_URL_ENV, CHUNK_SIZE_ENV] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn defaults_point_at_google_and_create_the_config_dir() {
    clear_overrides();
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("nested").join("gclass-cli");
    env::set_var(CONFIG_DIR_ENV, &config_dir);

    let config = load_config().expect("Config should load");

    assert!(config_dir.is_dir());
    assert_eq!(config.paths.token, config_dir.join("token.json"));
    assert_eq!(config.classroom_url, "https://classroom.googleapis.com/v1");
    assert_eq!(
        config.drive_upload_url,
        "https://www.googleapis.com/upload/drive/v3/files"
    );
    assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    assert_eq!(config.http_timeout, Duration::from_secs(60));
    env::remove_var(CONFIG_DIR_ENV);
}

#[test]
#[serial]
fn overrides_are_trimmed_and_chunk_size_aligned() {
    clear_overrides();
    let dir = TempDir::new().unwrap();
    env::set_var(CONFIG_DIR_ENV, dir.path());
    env::set_var(CLASSROOM_URL_ENV, " http://127.0.0.1:9000/v1/ ");
    env::set_var(CHUNK_SIZE_ENV, (CHUNK_ALIGN * 2 + 5).to_string());

    let config = load_config().expect("Config should load");

    assert_eq!(config.classroom_url, "http://127.0.0.1:9000/v1");
    assert_eq!(config.chunk_size, CHUNK_ALIGN * 2);
    clear_overrides();
    env::remove_var(CONFIG_DIR_ENV);
}

#[test]
#[serial]
fn non_numeric_chunk_size_is_rejected() {
    clear_overrides();
    let dir = TempDir::new().unwrap();
    env::set_var(CONFIG_DIR_ENV, dir.path());
    env::set_var(CHUNK_SIZE_ENV, "lots");

    let err = load_config().unwrap_err();
    assert!(err.to_string().contains(CHUNK_SIZE_ENV));
    clear_overrides();
    env::remove_var(CONFIG_DIR_ENV);
}
