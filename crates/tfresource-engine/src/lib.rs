//! Infrastructure engine clients for tfresource.
//!
//! This crate implements the execution layer: the `InfraEngine` trait the
//! lifecycle core drives (init/plan/apply/destroy/output), the Terraform CLI
//! engine that shells out to `terraform`, a deterministic `MockEngine` that
//! simulates Terraform against a `StateStore`, and engine selection from the
//! process environment.

pub mod config;
pub mod engine;
pub mod mock;
pub mod terraform;

pub use config::EngineConfig;
pub use engine::{select_engine, BackendPointer, InfraEngine, Invocation, OutputMap, OutputValue};
pub use mock::{EngineCall, EngineStep, MockEngine};
pub use terraform::TerraformCli;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("`{command}` failed ({status}):\n{stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("unknown engine '{0}'")]
    UnknownEngine(String),
    #[error("engine binary not available: {0}")]
    Unavailable(String),
    #[error("engine not initialized before {0}")]
    NotInitialized(&'static str),
    #[error("no plan to apply: {0}")]
    NoPlan(String),
    #[error("malformed engine output: {0}")]
    MalformedOutput(String),
    #[error("engine state error: {0}")]
    Store(#[from] tfresource_store::StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("injected failure during {0}")]
    Injected(String),
}

pub(crate) fn poisoned<T>(e: std::sync::PoisonError<T>) -> EngineError {
    EngineError::Io(std::io::Error::other(format!("mutex poisoned: {e}")))
}
