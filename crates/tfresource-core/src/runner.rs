use crate::{
    build_version, extract_metadata, resolve_action, CoreError, LifecycleAction, PlanArtifact,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tfresource_engine::{
    select_engine, BackendPointer, EngineConfig, InfraEngine, Invocation, OutputMap,
};
use tfresource_schema::{
    validate_env_name, MetadataField, OutParams, OutRequest, OutResponse, SchemaError, Terraform,
};
use tfresource_store::{select_store, StateKeys, StateStore, StoreLocation};
use tracing::{debug, info};

/// Executes one `out` request.
///
/// Engine and store are built from the request unless injected with
/// [`with_engine`](Self::with_engine) / [`with_store`](Self::with_store).
/// Nothing is retained between runs beyond those injected handles.
pub struct Runner {
    source_dir: PathBuf,
    engine_config: EngineConfig,
    engine: Option<Arc<dyn InfraEngine>>,
    store: Option<Arc<dyn StateStore>>,
}

/// Everything resolved from a request before any external call.
struct Prepared {
    action: LifecycleAction,
    terraform: Terraform,
    keys: StateKeys,
    invocation: Invocation,
}

impl Runner {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            engine_config: EngineConfig::default(),
            engine: None,
            store: None,
        }
    }

    #[must_use]
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn InfraEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn run(&self, request: &OutRequest) -> Result<OutResponse, CoreError> {
        let prepared = self.prepare(request)?;
        let Prepared {
            action,
            terraform,
            keys,
            invocation,
        } = &prepared;
        info!(
            "{action} for environment {} in {}",
            keys.env_name,
            invocation.working_dir.display()
        );

        let store = match &self.store {
            Some(store) => Arc::clone(store),
            None => select_store(
                &terraform.backend_type,
                &terraform.backend_config,
                &invocation.working_dir,
            )?,
        };
        let engine = match &self.engine {
            Some(engine) => Arc::clone(engine),
            None => select_engine(&self.engine_config, Arc::clone(&store))?,
        };
        debug!(
            "engine {}, store {}, main key {}, plan key {}",
            engine.name(),
            store.name(),
            keys.main,
            keys.plan
        );

        let plan = PlanArtifact::new(store.as_ref(), keys);
        let pointer = BackendPointer {
            backend_type: terraform.backend_type.clone(),
            backend_config: terraform.backend_config.clone(),
            keys: keys.clone(),
            target: action.init_target(),
        };

        let outputs = match action {
            LifecycleAction::PlanOnly => {
                engine.init(invocation, &pointer)?;
                info!("planning {} into {}", keys.env_name, plan.key());
                engine.plan(invocation)?;
                None
            }
            LifecycleAction::PlanRun => {
                plan.ensure_exists()?;
                engine.init(invocation, &pointer)?;
                info!("applying saved plan for {}", keys.env_name);
                let outputs = engine.apply(invocation, true)?;
                plan.delete()?;
                Some(outputs)
            }
            LifecycleAction::CreateDirect => {
                engine.init(invocation, &pointer)?;
                info!("planning and applying {}", keys.env_name);
                engine.plan(invocation)?;
                Some(engine.apply(invocation, false)?)
            }
            LifecycleAction::Destroy => {
                engine.init(invocation, &pointer)?;
                info!("destroying {}", keys.env_name);
                engine.destroy(invocation)?;
                plan.delete()?;
                None
            }
        };

        let version = build_version(*action, store.as_ref(), keys)?;
        let metadata = response_metadata(&keys.env_name, outputs.as_ref());
        info!("{action} for {} complete", keys.env_name);
        Ok(OutResponse { version, metadata })
    }

    /// Validate the request and derive keys and engine inputs. Makes no
    /// engine or store calls.
    fn prepare(&self, request: &OutRequest) -> Result<Prepared, CoreError> {
        let action = resolve_action(&request.params)?;
        let env_name = self.resolve_env_name(&request.params)?;
        let terraform = request.terraform();
        if terraform.source.is_empty() {
            return Err(SchemaError::MissingField("params.terraform_source").into());
        }
        if terraform.backend_type.is_empty() {
            return Err(SchemaError::MissingField("source.backend_type").into());
        }
        let location =
            StoreLocation::from_backend(&terraform.backend_type, &terraform.backend_config)?;
        let keys = StateKeys::new(&location, &env_name);
        let invocation = Invocation {
            working_dir: self.source_dir.join(&terraform.source),
            env: terraform.env.clone(),
            vars: terraform.vars.clone(),
            var_files: terraform
                .var_files
                .iter()
                .map(|f| self.source_dir.join(f))
                .collect(),
        };
        Ok(Prepared {
            action,
            terraform,
            keys,
            invocation,
        })
    }

    fn resolve_env_name(&self, params: &OutParams) -> Result<String, CoreError> {
        let name = match (&params.env_name_file, params.env_name.is_empty()) {
            (_, false) => params.env_name.clone(),
            (Some(file), true) => {
                let path = self.source_dir.join(file);
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    CoreError::InvalidRequest(format!(
                        "cannot read env_name_file {}: {e}",
                        path.display()
                    ))
                })?;
                contents.trim().to_owned()
            }
            (None, true) => return Err(SchemaError::MissingField("params.env_name").into()),
        };
        validate_env_name(&name)?;
        Ok(name)
    }
}

/// Plan-only and destroy runs report only the environment name.
fn response_metadata(env_name: &str, outputs: Option<&OutputMap>) -> Vec<MetadataField> {
    match outputs {
        Some(outputs) => extract_metadata(env_name, outputs),
        None => extract_metadata(env_name, &OutputMap::new()),
    }
}
