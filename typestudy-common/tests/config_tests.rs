//! Config file loading tests
//!
//! Tests that touch TYPESTUDY_CONFIG are marked #[serial] so they do not race
//! on the process environment.

use serial_test::serial;
use std::env;
use std::path::Path;
use typestudy_common::config::{
    config_file_path, load_toml_config, BackendKind, CliOverrides, ServiceConfig, CONFIG_PATH_ENV,
};

#[test]
fn test_missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_toml_config(&dir.path().join("absent.toml")).unwrap();

    assert!(config.bind_addr.is_none());
    assert!(config.backend.is_none());
    assert!(config.credentials.refresh_token.is_none());
}

#[test]
fn test_full_config_file_parses() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
bind_addr = "0.0.0.0:8080"
drive_folder_id = "1AbCdEf"
backend = "memory"
counter_file = "ids.json"
read_retries = 5
retry_backoff_ms = 250

[logging]
level = "debug"

[credentials]
client_id = "cid"
client_secret = "csecret"
refresh_token = "rtoken"
"#,
    )
    .unwrap();

    let toml = load_toml_config(&path).unwrap();
    assert_eq!(toml.backend, Some(BackendKind::Memory));
    assert_eq!(toml.logging.level.as_deref(), Some("debug"));

    let config = ServiceConfig::resolve_with(&CliOverrides::default(), &toml, |_| None).unwrap();
    assert_eq!(config.bind_addr, "0.0.0.0:8080");
    assert_eq!(config.drive_folder_id, "1AbCdEf");
    assert_eq!(config.counter_file, "ids.json");
    assert_eq!(config.tracking_file, "tracking.csv");
    assert_eq!(config.read_retries, 5);
    assert_eq!(config.retry_backoff.as_millis(), 250);
    assert_eq!(config.log_level, "debug");
}

#[test]
fn test_service_account_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("key.json");
    std::fs::write(
        &key_path,
        r#"{"type":"service_account","client_email":"a@b.iam.gserviceaccount.com","private_key":"pem","token_uri":"https://oauth2.googleapis.com/token"}"#,
    )
    .unwrap();

    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "drive_folder_id = \"f\"\n[credentials]\nservice_account_file = {:?}\n",
            key_path.display().to_string()
        ),
    )
    .unwrap();

    let toml = load_toml_config(&config_path).unwrap();
    let config = ServiceConfig::resolve_with(&CliOverrides::default(), &toml, |_| None).unwrap();
    assert_eq!(config.backend, BackendKind::Google);
    assert!(matches!(
        config.credentials,
        typestudy_common::config::Credentials::ServiceAccount(ref key)
            if key.client_email == "a@b.iam.gserviceaccount.com"
    ));
}

#[test]
fn test_malformed_config_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "bind_addr = [unterminated").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Parse TOML failed"));
}

#[test]
#[serial]
fn test_config_path_priority() {
    env::set_var(CONFIG_PATH_ENV, "/tmp/typestudy-env.toml");

    let explicit = config_file_path(Some(Path::new("/tmp/explicit.toml")));
    assert_eq!(explicit.as_deref(), Some(Path::new("/tmp/explicit.toml")));

    let from_env = config_file_path(None);
    assert_eq!(from_env.as_deref(), Some(Path::new("/tmp/typestudy-env.toml")));

    env::remove_var(CONFIG_PATH_ENV);
}

#[test]
#[serial]
fn test_config_path_default_is_under_config_dir() {
    env::remove_var(CONFIG_PATH_ENV);

    if let Some(path) = config_file_path(None) {
        assert!(path.ends_with("typestudy/config.toml"));
    }
}
