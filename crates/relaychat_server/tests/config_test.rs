use relaychat_server::{ReferenceStyle, RelayConfig};
use std::time::Duration;

#[test]
fn test_defaults() {
    let config = RelayConfig::default();
    assert_eq!(config.listen_addr(), "0.0.0.0:3000");
    assert_eq!(*config.reference_style(), ReferenceStyle::Url);
    assert_eq!(config.public_upload_prefix(), "/uploads");
    assert_eq!(config.buffered_timeout(), Duration::from_secs(300));
    assert_eq!(config.upload_limit(), Some(10 * 1024 * 1024));
    assert!(config.upload_body_limit() > Some(10 * 1024 * 1024));
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_from_toml_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("relay.toml");
    std::fs::write(
        &path,
        r#"
backend_url = "http://gpu-box:8001"
reference_style = "absolute_path"
buffered_timeout_secs = 120
max_upload_bytes = 0
log_format = "json"
"#,
    )?;

    let config = RelayConfig::load(Some(&path))?;
    assert_eq!(config.backend_url(), "http://gpu-box:8001");
    assert_eq!(*config.reference_style(), ReferenceStyle::AbsolutePath);
    assert_eq!(config.buffered_timeout(), Duration::from_secs(120));
    assert_eq!(config.upload_limit(), None);
    assert_eq!(config.upload_body_limit(), None);
    assert_eq!(config.listen_addr(), "0.0.0.0:3000");
    Ok(())
}

#[test]
fn test_overrides_win_over_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("relay.toml");
    std::fs::write(&path, "listen_addr = \"127.0.0.1:4000\"\n")?;

    let config = RelayConfig::load_with_overrides(
        Some(&path),
        [("listen_addr", "127.0.0.1:5000".to_string())],
    )?;
    assert_eq!(config.listen_addr(), "127.0.0.1:5000");
    Ok(())
}

#[test]
fn test_metrics_settings() -> Result<(), Box<dyn std::error::Error>> {
    let defaults = RelayConfig::default();
    assert_eq!(*defaults.metrics_endpoint(), None);
    assert_eq!(defaults.metrics_interval(), Duration::from_secs(30));

    let config = RelayConfig::load_with_overrides(
        None,
        [("metrics_endpoint", "http://collector:4318".to_string())],
    )?;
    assert_eq!(
        config.metrics_endpoint().as_deref(),
        Some("http://collector:4318")
    );
    Ok(())
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = RelayConfig::load(Some(&dir.path().join("absent.toml")));
    assert!(result.is_err());
}

#[test]
fn test_validation_rejects_bad_values() {
    let bad_prefix = RelayConfig::builder()
        .public_upload_prefix("uploads")
        .build()
        .expect("builder");
    assert!(bad_prefix.validate().is_err());

    let bad_timeouts = RelayConfig::builder()
        .buffered_timeout_secs(600u64)
        .max_timeout_secs(60u64)
        .build()
        .expect("builder");
    assert!(bad_timeouts.validate().is_err());

    let bad_backend = RelayConfig::builder()
        .backend_url("not a url")
        .build()
        .expect("builder");
    assert!(bad_backend.validate().is_err());
}
