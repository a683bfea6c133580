use std::path::PathBuf;

use secrecy::ExposeSecret;
use solidq::config::{Config, DEFAULT_PORT, DEFAULT_ROOT};
use solidq::error::Error;

const VARS: [&str; 6] = [
    "SOLIDQ_ROOT",
    "SOLIDQ_PORT",
    "SOLIDQ_SECRET",
    "SOLIDQ_CROSS_ORIGIN",
    "OTEL_ENDPOINT",
    "LOG_LEVEL",
];

fn clear_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

// Everything touching the process environment lives in one test so the
// cases cannot race each other.
#[test]
fn config_from_env() {
    clear_env();
    let config = Config::from_env().unwrap();
    assert_eq!(config.root_path, PathBuf::from(DEFAULT_ROOT));
    assert_eq!(config.port, DEFAULT_PORT);
    assert!(config.secret.is_none());
    assert!(config.cross_origin);
    assert_eq!(config.log_level, "info");

    unsafe {
        std::env::set_var("SOLIDQ_ROOT", "/tmp/solidq-test");
        std::env::set_var("SOLIDQ_PORT", "9090");
        std::env::set_var("SOLIDQ_SECRET", "s3cret");
        std::env::set_var("SOLIDQ_CROSS_ORIGIN", "false");
        std::env::set_var("LOG_LEVEL", "debug");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.root_path, PathBuf::from("/tmp/solidq-test"));
    assert_eq!(config.port, 9090);
    assert_eq!(config.secret.unwrap().expose_secret(), "s3cret");
    assert!(!config.cross_origin);
    assert_eq!(config.log_level, "debug");

    unsafe { std::env::set_var("SOLIDQ_PORT", "not-a-port") };
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    // An empty secret leaves the server open.
    unsafe {
        std::env::set_var("SOLIDQ_PORT", "9090");
        std::env::set_var("SOLIDQ_SECRET", "");
    }
    assert!(Config::from_env().unwrap().secret.is_none());

    clear_env();
}

#[test]
fn config_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("solidq.toml");
    std::fs::write(
        &path,
        r#"
root_path = "/srv/queues"
port = 7000
secret = "from-file"
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.root_path, PathBuf::from("/srv/queues"));
    assert_eq!(config.port, 7000);
    assert_eq!(config.secret.unwrap().expose_secret(), "from-file");
    // Unset keys keep their defaults.
    assert!(config.cross_origin);
    assert!(config.otel_endpoint.is_none());
}

#[test]
fn config_file_rejects_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("solidq.toml");
    std::fs::write(&path, "prot = 7000\n").unwrap();

    assert!(matches!(Config::from_file(&path), Err(Error::Config(_))));
}

#[test]
fn missing_config_file_is_a_config_error() {
    let err = Config::from_file(std::path::Path::new("/nonexistent/solidq.toml")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
