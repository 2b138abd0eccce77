//! Loading configuration from disk.

use std::io::Write;

use abook_config::{AbookConfig, ConfigError};
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "collection: office\ncommand:\n  grace_period: 2s\nremote:\n  quota_limit: 10"
    )
    .unwrap();

    let config = AbookConfig::from_file(file.path()).unwrap();
    assert_eq!(config.collection, "office");
    assert_eq!(config.grace_period_secs(), 2);
    assert_eq!(config.remote.quota_limit, 10);
    assert!(config.validate_or_err().is_ok());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AbookConfig::from_file(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::IoError(_)));
}

#[test]
fn test_invalid_file_reports_every_problem() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "collection: ''\nremote:\n  failure_rate: 2.0\n  quota_limit: 0"
    )
    .unwrap();

    let config = AbookConfig::from_file(file.path()).unwrap();
    let errors = config.validate();
    assert_eq!(errors.len(), 3, "{:?}", errors);
}
