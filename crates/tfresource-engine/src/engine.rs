use crate::{EngineConfig, EngineError, MockEngine, TerraformCli};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tfresource_store::{StateKeys, StateStore, StateTarget};

/// One output value as reported by `terraform output -json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputValue {
    pub value: Value,
    #[serde(default)]
    pub sensitive: bool,
}

impl OutputValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            sensitive: false,
        }
    }

    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Engine outputs in the order the engine reported them.
pub type OutputMap = IndexMap<String, OutputValue>;

/// Everything an engine command needs besides the backend pointer.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub working_dir: PathBuf,
    /// Passed to the engine process unmodified.
    pub env: BTreeMap<String, String>,
    pub vars: Map<String, Value>,
    pub var_files: Vec<PathBuf>,
}

/// Backend location an engine is initialized against.
#[derive(Debug, Clone)]
pub struct BackendPointer {
    pub backend_type: String,
    pub backend_config: Map<String, Value>,
    pub keys: StateKeys,
    pub target: StateTarget,
}

impl BackendPointer {
    /// The key the pointer currently targets.
    pub fn key(&self) -> &str {
        self.keys.key(self.target)
    }

    pub fn env_name(&self) -> &str {
        &self.keys.env_name
    }
}

pub trait InfraEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Configure the working directory against `backend`. Must precede every
    /// other call.
    fn init(&self, invocation: &Invocation, backend: &BackendPointer) -> Result<(), EngineError>;

    /// Compute a plan. When initialized against the plan target, the plan is
    /// persisted at the plan key; otherwise it is kept for a following
    /// [`apply`](Self::apply) in the same invocation.
    fn plan(&self, invocation: &Invocation) -> Result<(), EngineError>;

    /// Apply the plan from this invocation, or the persisted plan when
    /// `use_plan_file` is set, and return the resulting outputs.
    fn apply(&self, invocation: &Invocation, use_plan_file: bool)
        -> Result<OutputMap, EngineError>;

    /// Tear down everything tracked by the main state.
    fn destroy(&self, invocation: &Invocation) -> Result<(), EngineError>;

    fn output(&self, invocation: &Invocation) -> Result<OutputMap, EngineError>;
}

pub fn select_engine(
    config: &EngineConfig,
    store: Arc<dyn StateStore>,
) -> Result<Arc<dyn InfraEngine>, EngineError> {
    match config.engine.as_str() {
        "terraform" => Ok(Arc::new(TerraformCli::new(config.terraform_bin.clone()))),
        "mock" => Ok(Arc::new(MockEngine::new(store))),
        other => Err(EngineError::UnknownEngine(other.to_owned())),
    }
}
