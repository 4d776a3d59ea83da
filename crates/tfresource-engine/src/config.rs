/// Selects the engine implementation (`terraform` or `mock`).
pub const ENGINE_ENV: &str = "TFRESOURCE_ENGINE";
/// Path or name of the Terraform binary.
pub const TERRAFORM_BIN_ENV: &str = "TFRESOURCE_TERRAFORM_BIN";

pub const DEFAULT_ENGINE: &str = "terraform";
pub const DEFAULT_TERRAFORM_BIN: &str = "terraform";

/// Process-level engine settings. Everything request-specific travels in the
/// request JSON instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub engine: String,
    pub terraform_bin: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_owned(),
            terraform_bin: DEFAULT_TERRAFORM_BIN.to_owned(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            engine: non_empty(ENGINE_ENV).unwrap_or(defaults.engine),
            terraform_bin: non_empty(TERRAFORM_BIN_ENV).unwrap_or(defaults.terraform_bin),
        }
    }

    #[must_use]
    pub fn with_engine(mut self, engine: &str) -> Self {
        engine.clone_into(&mut self.engine);
        self
    }
}
