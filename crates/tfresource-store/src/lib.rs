//! Backend state store clients for tfresource.
//!
//! The Terraform backend that holds environment state is treated as a keyed
//! object store. This crate provides the `StateStore` trait the lifecycle core
//! consumes, the single key derivation used for both state and plan objects,
//! and concrete stores: `LocalStore` (filesystem, matching Terraform's `local`
//! backend), `MemoryStore` (tests), and `S3Store` (behind the `s3` feature).

pub mod keys;
pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use keys::{state_key, workspace_name, StateKeys, StateTarget, StoreLocation};
pub use local::LocalStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("backend request failed: {0}")]
    Backend(String),
    #[error("invalid backend config: {0}")]
    Config(String),
    #[error("unsupported backend type '{0}'")]
    UnsupportedBackend(String),
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
}

impl StoreError {
    /// Whether the error stems from the request's backend settings rather
    /// than from talking to the backend.
    pub fn is_config(&self) -> bool {
        matches!(self, StoreError::Config(_) | StoreError::UnsupportedBackend(_))
    }
}

/// Keyed object store holding Terraform state and plan artifacts.
///
/// All operations are idempotent. Deleting a missing key succeeds;
/// `last_modified` and `get_object` on a missing key return
/// [`StoreError::NotFound`].
pub trait StateStore: Send + Sync {
    fn name(&self) -> &str;

    fn object_exists(&self, key: &str) -> Result<bool, StoreError>;

    fn last_modified(&self, key: &str) -> Result<DateTime<Utc>, StoreError>;

    fn delete_object(&self, key: &str) -> Result<(), StoreError>;

    /// Read an object. Only engine adapters that simulate Terraform's own
    /// backend writes use this and [`put_object`](Self::put_object).
    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    fn put_object(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;
}

/// Build the store client matching a request's backend.
///
/// Relative local paths resolve against `working_dir`, the same way
/// Terraform resolves them.
pub fn select_store(
    backend_type: &str,
    backend_config: &Map<String, Value>,
    working_dir: &Path,
) -> Result<Arc<dyn StateStore>, StoreError> {
    match backend_type {
        "local" => Ok(Arc::new(LocalStore::new(working_dir))),
        #[cfg(feature = "s3")]
        "s3" => Ok(Arc::new(s3::S3Store::from_backend_config(backend_config)?)),
        #[cfg(not(feature = "s3"))]
        "s3" => {
            let _ = backend_config;
            Err(StoreError::UnsupportedBackend(
                "s3 (built without the `s3` feature)".to_owned(),
            ))
        }
        other => Err(StoreError::UnsupportedBackend(other.to_owned())),
    }
}

/// Read a string setting from a backend config map.
pub(crate) fn config_str<'a>(config: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Read a boolean setting, accepting both JSON booleans and `"true"`/`"false"`.
#[cfg_attr(not(feature = "s3"), allow(dead_code))]
pub(crate) fn config_bool(config: &Map<String, Value>, key: &str) -> Result<bool, StoreError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| StoreError::Config(format!("'{key}' must be a boolean, got '{s}'"))),
        Some(other) => Err(StoreError::Config(format!(
            "'{key}' must be a boolean, got {other}"
        ))),
    }
}
