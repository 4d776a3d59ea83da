//! Wire model for the tfresource pipeline resource.
//!
//! This crate defines the JSON shapes exchanged with the pipeline: the `out`
//! request (`OutRequest` with its `Source` and `OutParams`), the response
//! (`OutResponse`, `Version`, `MetadataField`), the requested `Action`, and
//! environment name validation shared by every other crate.

pub mod name;
pub mod request;
pub mod response;

pub use name::{validate_env_name, PLAN_SUFFIX};
pub use request::{Action, OutParams, OutRequest, Source, Terraform};
pub use response::{MetadataField, OutResponse, Version};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse request: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read request: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid environment name '{name}': {reason}")]
    InvalidEnvName { name: String, reason: String },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
