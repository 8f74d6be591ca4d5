//! Config environment variable tests
//!
//! These tests verify that Config::from_env() reads and validates
//! environment variable overrides. Config::from_env() also loads a .env
//! file via dotenvy, so every test sets the variables it depends on.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use arg_claim_sessions::api::Semantics;
use arg_claim_sessions::config::{Config, LogFormat, DEFAULT_BASE_URL};
use serial_test::serial;
use std::env;
use std::time::Duration;

const VARS: &[&str] = &[
    "ARG_API_BASE_URL",
    "ARG_SEMANTICS",
    "ARG_AF_DEPTH",
    "ARG_AF_BREADTH",
    "REQUEST_TIMEOUT_MS",
    "MAX_RETRIES",
    "RETRY_DELAY_MS",
    "CHANNEL_IDLE_TIMEOUT_MS",
    "CHANNEL_NAMESPACE",
    "LOG_LEVEL",
    "LOG_FORMAT",
];

fn clean_env() {
    env::set_var("ARG_API_KEY", "test-key");
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_config_defaults() {
    clean_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.api.api_key, "test-key");
    assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.mining.semantics, Semantics::Dfquad);
    assert_eq!(config.mining.depth, 1);
    assert_eq!(config.mining.breadth, 2);
    assert_eq!(config.channel.namespace, "/ws/arguments/mine");
    assert_eq!(config.channel.idle_timeout(), Some(Duration::from_secs(600)));
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.request.timeout_ms, 30000);
}

#[test]
#[serial]
fn test_config_requires_api_key() {
    clean_env();
    env::remove_var("ARG_API_KEY");

    let result = Config::from_env();

    // a .env file in the working directory may still provide the key
    if env::var("ARG_API_KEY").is_err() {
        let err = result.unwrap_err();
        assert!(err.to_string().contains("ARG_API_KEY"));
    }
    env::set_var("ARG_API_KEY", "test-key");
}

#[test]
#[serial]
fn test_config_mining_overrides() {
    clean_env();
    env::set_var("ARG_SEMANTICS", "QE");
    env::set_var("ARG_AF_DEPTH", "2");
    env::set_var("ARG_AF_BREADTH", "4");

    let config = Config::from_env().unwrap();
    assert_eq!(config.mining.semantics, Semantics::Qe);
    assert_eq!(config.mining.depth, 2);
    assert_eq!(config.mining.breadth, 4);

    clean_env();
}

#[test]
#[serial]
fn test_config_rejects_out_of_range_mining_settings() {
    clean_env();

    env::set_var("ARG_AF_DEPTH", "3");
    assert!(Config::from_env().is_err());

    env::set_var("ARG_AF_DEPTH", "1");
    env::set_var("ARG_AF_BREADTH", "0");
    assert!(Config::from_env().is_err());

    env::set_var("ARG_AF_BREADTH", "many");
    assert!(Config::from_env().is_err());

    env::remove_var("ARG_AF_BREADTH");
    env::set_var("ARG_SEMANTICS", "hcat");
    assert!(Config::from_env().is_err());

    clean_env();
}

#[test]
#[serial]
fn test_config_channel_overrides() {
    clean_env();
    env::set_var("CHANNEL_IDLE_TIMEOUT_MS", "0");
    env::set_var("CHANNEL_NAMESPACE", "/ws/custom");

    let config = Config::from_env().unwrap();
    assert!(config.channel.idle_timeout().is_none());
    assert_eq!(config.channel.namespace, "/ws/custom");

    clean_env();
}

#[test]
#[serial]
fn test_config_custom_base_url_and_logging() {
    clean_env();
    env::set_var("ARG_API_BASE_URL", "http://localhost:5000");
    env::set_var("LOG_FORMAT", "json");
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::from_env().unwrap();
    assert_eq!(config.api.base_url, "http://localhost:5000");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.level, "debug");

    clean_env();
}

#[test]
#[serial]
fn test_config_custom_request() {
    clean_env();
    env::set_var("REQUEST_TIMEOUT_MS", "60000");
    env::set_var("MAX_RETRIES", "5");
    env::set_var("RETRY_DELAY_MS", "2000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);
    assert_eq!(config.request.retry_delay_ms, 2000);

    clean_env();
}
