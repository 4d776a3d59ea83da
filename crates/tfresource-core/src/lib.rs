//! Lifecycle runner for the tfresource pipeline resource.
//!
//! This crate turns one `out` request into one of four lifecycle actions and
//! drives an `InfraEngine` and a `StateStore` through it. It owns every
//! decision about plan artifacts (when they are created, consumed and
//! cleaned up) and derives the reported `Version` and metadata from the
//! outcome.

pub mod action;
pub mod metadata;
pub mod plan;
pub mod runner;
pub mod version;

pub use action::{resolve_action, LifecycleAction};
pub use metadata::{extract_metadata, SENSITIVE_PLACEHOLDER};
pub use plan::PlanArtifact;
pub use runner::Runner;
pub use version::build_version;

use tfresource_engine::EngineError;
use tfresource_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Schema(#[from] tfresource_schema::SchemaError),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("no plan for environment '{env_name}' at '{key}'; run a plan_only step first")]
    MissingPlan { env_name: String, key: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure classes reported to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    MissingPlan,
    EngineFailure,
    BackendFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidRequest => write!(f, "invalid request"),
            ErrorKind::MissingPlan => write!(f, "missing plan"),
            ErrorKind::EngineFailure => write!(f, "engine failure"),
            ErrorKind::BackendFailure => write!(f, "backend failure"),
        }
    }
}

fn store_kind(e: &StoreError) -> ErrorKind {
    if e.is_config() {
        ErrorKind::InvalidRequest
    } else {
        ErrorKind::BackendFailure
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Schema(_) | CoreError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CoreError::MissingPlan { .. } | CoreError::Engine(EngineError::NoPlan(_)) => {
                ErrorKind::MissingPlan
            }
            CoreError::Store(e) | CoreError::Engine(EngineError::Store(e)) => store_kind(e),
            CoreError::Engine(EngineError::UnknownEngine(_)) => ErrorKind::InvalidRequest,
            CoreError::Engine(_) => ErrorKind::EngineFailure,
        }
    }
}
