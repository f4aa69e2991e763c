//! Common test utilities.
//!
//! Shared helpers for integration tests. Import with `mod common;`.

#![allow(dead_code)]

use bytes::Bytes;
use scopestore::core::config::{Config, StoreConfig};
use scopestore::core::time::{Deadline, ManualClock};
use scopestore::store::{Location, ScopeLocator, Store};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Start of the manual clock used by store fixtures.
pub const CLOCK_START_MS: u64 = 1_700_000_000_000;

/// Write `content` to a temporary TOML file.
pub fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    config_file(
        r#"
[listener]
bind = "127.0.0.1:0"
"#,
    )
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// Configuration bound to an ephemeral loopback port.
pub fn loopback_config() -> Config {
    let mut config = Config::default();
    config.listener.bind = "127.0.0.1:0".into();
    config
}

/// Store on a manual clock with default settings.
pub fn manual_store() -> (Store, Arc<ManualClock>) {
    manual_store_with(StoreConfig::default())
}

/// Store on a manual clock with custom settings.
pub fn manual_store_with(config: StoreConfig) -> (Store, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(CLOCK_START_MS));
    (Store::with_clock(config, clock.clone()), clock)
}

/// A generous request deadline.
pub fn deadline() -> Deadline {
    Deadline::after_ms(1_000)
}

pub fn global(key: &str) -> Location {
    Location::new(ScopeLocator::global(), key)
}

pub fn bridge(b: &str, key: &str) -> Location {
    Location::new(ScopeLocator::bridge(b), key)
}

pub fn instance(b: &str, i: &str, key: &str) -> Location {
    Location::new(ScopeLocator::instance(b, i), key)
}

/// Shorthand for a byte value.
pub fn b(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}
