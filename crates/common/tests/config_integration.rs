//! Configuration integration tests
//!
//! Loads operation configuration from TOML and checks it reaches the
//! operations built from it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use quiesce_common::config::MAX_DELAY;
use quiesce_common::sync::OperationBuilder;
use quiesce_common::{ErrorClassification, OperationConfig, SchedulerError};

const FULL_CONFIG: &str = r#"
name = "index-refresh"
delay = 250
background = false
thread_name = "index-refresh-worker"
"#;

/// Validates a complete document configures a delayed operation.
///
/// # Test Steps
/// 1. Parse a TOML document with every field set
/// 2. Build a delayed operation from it
/// 3. Verify the name and delay carried over
#[test]
fn test_toml_config_builds_delayed_operation() -> Result<()> {
    let config = OperationConfig::from_toml_str(FULL_CONFIG)?;
    assert_eq!(config.name, "index-refresh");
    assert_eq!(config.delay, Duration::from_millis(250));
    assert_eq!(config.worker_thread_name(), "index-refresh-worker");

    let operation = OperationBuilder::from_config(config).build_delayed(|_| Ok(()))?;
    assert_eq!(operation.name(), "index-refresh");
    assert_eq!(operation.delay(), Duration::from_millis(250));
    Ok(())
}

/// Validates the configured thread name reaches the dedicated worker.
#[test]
fn test_toml_config_names_worker_thread() -> Result<()> {
    let config = OperationConfig::from_toml_str(FULL_CONFIG)?;
    let seen = Arc::new(std::sync::Mutex::new(None));
    let slot = Arc::clone(&seen);
    let operation = OperationBuilder::from_config(config).build_long_running(move |_| {
        *slot.lock().expect("name slot lock") = std::thread::current().name().map(str::to_string);
        Ok(())
    })?;

    operation.run_async()?;
    assert!(operation.wait_until_idle(Duration::from_secs(5)));
    assert_eq!(
        seen.lock().expect("name slot lock").as_deref(),
        Some("index-refresh-worker")
    );
    Ok(())
}

/// Validates an empty document yields the defaults.
#[test]
fn test_empty_document_uses_defaults() -> Result<()> {
    let config = OperationConfig::from_toml_str("")?;
    assert_eq!(config, OperationConfig::default());
    Ok(())
}

/// Validates configuration survives a TOML round trip.
#[test]
fn test_config_serializes_delay_as_millis() -> Result<()> {
    let config = OperationConfig::builder().name("flush").delay(Duration::from_secs(2)).build()?;
    let text = toml::to_string(&config)?;
    assert!(text.contains("delay = 2000"), "unexpected document: {text}");
    assert_eq!(OperationConfig::from_toml_str(&text)?, config);
    Ok(())
}

/// Validates rejected documents surface as non-retryable configuration
/// errors.
#[test]
fn test_invalid_documents_are_rejected() {
    let too_long = format!("delay = {}", MAX_DELAY.as_millis() + 1);
    let cases = [
        ("name = \"\"", "name"),
        ("thread_name = \"  \"", "thread_name"),
        (too_long.as_str(), "delay"),
    ];

    for (document, expected_field) in cases {
        let err = OperationConfig::from_toml_str(document).unwrap_err();
        match &err {
            SchedulerError::Config { field, .. } => assert_eq!(field, expected_field),
            other => panic!("expected config error for {document:?}, got {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    let err = OperationConfig::from_toml_str("delay = \"soon\"").unwrap_err();
    assert!(matches!(err, SchedulerError::ConfigParse(_)));
}

/// Validates builder overrides apply on top of a loaded configuration.
#[test]
fn test_builder_overrides_loaded_config() -> Result<()> {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let config = OperationConfig::from_toml_str(FULL_CONFIG)?;
    let operation = OperationBuilder::from_config(config)
        .delay(Duration::ZERO)
        .build_delayed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })?;

    assert_eq!(operation.delay(), Duration::ZERO);
    operation.run(false)?;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    Ok(())
}
