use crate::{config_str, StoreError};
use serde_json::{Map, Value};
use tfresource_schema::PLAN_SUFFIX;

pub const DEFAULT_STATE_FILE: &str = "terraform.tfstate";
/// Terraform's default `workspace_key_prefix` for the s3 backend.
pub const DEFAULT_S3_WORKSPACE_PREFIX: &str = "env:";
/// Terraform's default `workspace_dir` for the local backend.
pub const DEFAULT_LOCAL_WORKSPACE_DIR: &str = "terraform.tfstate.d";

/// Which of an environment's two backend objects an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTarget {
    /// The environment's real state.
    Main,
    /// The pending plan artifact.
    Plan,
}

impl std::fmt::Display for StateTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateTarget::Main => write!(f, "main"),
            StateTarget::Plan => write!(f, "plan"),
        }
    }
}

/// Where a backend keeps per-workspace state objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    pub workspace_prefix: String,
    pub state_file: String,
}

impl StoreLocation {
    pub fn new(workspace_prefix: &str, state_file: &str) -> Self {
        Self {
            workspace_prefix: workspace_prefix.trim_end_matches('/').to_owned(),
            state_file: state_file.to_owned(),
        }
    }

    /// Derive the layout Terraform uses for non-default workspaces of the
    /// given backend.
    pub fn from_backend(
        backend_type: &str,
        backend_config: &Map<String, Value>,
    ) -> Result<Self, StoreError> {
        match backend_type {
            "s3" => Ok(Self::new(
                config_str(backend_config, "workspace_key_prefix")
                    .unwrap_or(DEFAULT_S3_WORKSPACE_PREFIX),
                config_str(backend_config, "key").unwrap_or(DEFAULT_STATE_FILE),
            )),
            "local" => Ok(Self::new(
                config_str(backend_config, "workspace_dir").unwrap_or(DEFAULT_LOCAL_WORKSPACE_DIR),
                DEFAULT_STATE_FILE,
            )),
            other => Err(StoreError::UnsupportedBackend(other.to_owned())),
        }
    }
}

/// Workspace name for an environment: the name itself, or `<env>-plan`.
pub fn workspace_name(env_name: &str, target: StateTarget) -> String {
    match target {
        StateTarget::Main => env_name.to_owned(),
        StateTarget::Plan => format!("{env_name}{PLAN_SUFFIX}"),
    }
}

/// Compose `<workspace_prefix>/<env>[-plan]/<state_file>`.
pub fn state_key(workspace_prefix: &str, env_name: &str, is_plan: bool, state_file: &str) -> String {
    let target = if is_plan {
        StateTarget::Plan
    } else {
        StateTarget::Main
    };
    let workspace = workspace_name(env_name, target);
    let prefix = workspace_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{workspace}/{state_file}")
    } else {
        format!("{prefix}/{workspace}/{state_file}")
    }
}

/// The main state key and plan key of one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKeys {
    pub env_name: String,
    pub main: String,
    pub plan: String,
}

impl StateKeys {
    pub fn new(location: &StoreLocation, env_name: &str) -> Self {
        Self {
            env_name: env_name.to_owned(),
            main: state_key(
                &location.workspace_prefix,
                env_name,
                false,
                &location.state_file,
            ),
            plan: state_key(
                &location.workspace_prefix,
                env_name,
                true,
                &location.state_file,
            ),
        }
    }

    #[inline]
    pub fn key(&self, target: StateTarget) -> &str {
        match target {
            StateTarget::Main => &self.main,
            StateTarget::Plan => &self.plan,
        }
    }

    #[inline]
    pub fn workspace(&self, target: StateTarget) -> String {
        workspace_name(&self.env_name, target)
    }
}
