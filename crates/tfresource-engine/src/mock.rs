use crate::engine::{BackendPointer, InfraEngine, Invocation, OutputMap, OutputValue};
use crate::{poisoned, EngineError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tfresource_store::{StateStore, StateTarget, StoreError};
use tracing::debug;

/// Var naming the object the mock "provisions".
pub const OBJECT_KEY_VAR: &str = "object_key";
/// Var holding the provisioned object's content.
pub const OBJECT_CONTENT_VAR: &str = "object_content";
/// Output carrying the blake3 digest of `object_content`.
pub const CONTENT_HASH_OUTPUT: &str = "content_hash";

/// A recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Init(StateTarget),
    Plan,
    Apply { use_plan_file: bool },
    Destroy,
    Output,
}

/// Engine step a failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStep {
    Init,
    Plan,
    Apply,
    Destroy,
    Output,
}

impl EngineCall {
    fn step(&self) -> EngineStep {
        match self {
            EngineCall::Init(_) => EngineStep::Init,
            EngineCall::Plan => EngineStep::Plan,
            EngineCall::Apply { .. } => EngineStep::Apply,
            EngineCall::Destroy => EngineStep::Destroy,
            EngineCall::Output => EngineStep::Output,
        }
    }
}

/// Persisted plan document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct MockPlan {
    env_name: String,
    vars: Map<String, Value>,
    /// Serial of the main state the plan was computed against.
    base_serial: u64,
}

/// State document stored at the main key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct MockState {
    serial: u64,
    vars: Map<String, Value>,
    outputs: OutputMap,
}

#[derive(Default)]
struct Inner {
    backend: Option<BackendPointer>,
    pending: Option<MockPlan>,
    calls: Vec<EngineCall>,
    fail_on: Option<EngineStep>,
}

/// Deterministic engine that simulates Terraform against a [`StateStore`].
///
/// The desired configuration is simply the request vars. Applying writes a
/// state document at the main key and, when `object_key` is set, provisions
/// an object holding `object_content` in the same store.
pub struct MockEngine {
    store: Arc<dyn StateStore>,
    inner: Mutex<Inner>,
}

impl MockEngine {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Result<Vec<EngineCall>, EngineError> {
        Ok(self.inner.lock().map_err(poisoned)?.calls.clone())
    }

    /// Make the next call to `step` (and every later one) fail.
    pub fn fail_on(&self, step: EngineStep) -> Result<(), EngineError> {
        self.inner.lock().map_err(poisoned)?.fail_on = Some(step);
        Ok(())
    }

    fn record(&self, call: EngineCall) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        let step = call.step();
        inner.calls.push(call);
        if inner.fail_on == Some(step) {
            return Err(EngineError::Injected(format!("{step:?}").to_lowercase()));
        }
        Ok(())
    }

    fn backend(&self, command: &'static str) -> Result<BackendPointer, EngineError> {
        self.inner
            .lock()
            .map_err(poisoned)?
            .backend
            .clone()
            .ok_or(EngineError::NotInitialized(command))
    }

    fn read_state(&self, key: &str) -> Result<Option<MockState>, EngineError> {
        match self.store.get_object(key) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_plan(&self, key: &str) -> Result<MockPlan, EngineError> {
        match self.store.get_object(key) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(StoreError::NotFound(_)) => Err(EngineError::NoPlan(key.to_owned())),
            Err(e) => Err(e.into()),
        }
    }

    /// Bring the provisioned object in line with `desired`, touching the
    /// store only when something differs from `current`.
    fn reconcile_object(
        &self,
        current: Option<&Map<String, Value>>,
        desired: &Map<String, Value>,
    ) -> Result<(), EngineError> {
        let old_key = current.and_then(|vars| string_var(vars, OBJECT_KEY_VAR));
        let new_key = string_var(desired, OBJECT_KEY_VAR);
        if let Some(old) = &old_key {
            if new_key.as_ref() != Some(old) {
                debug!("mock: removing object {old}");
                self.store.delete_object(old)?;
            }
        }
        let Some(key) = new_key else {
            return Ok(());
        };
        let content = string_var(desired, OBJECT_CONTENT_VAR).unwrap_or_default();
        let old_content = current
            .and_then(|vars| string_var(vars, OBJECT_CONTENT_VAR))
            .unwrap_or_default();
        let unchanged = old_key.as_deref() == Some(key.as_str())
            && old_content == content
            && self.store.object_exists(&key)?;
        if unchanged {
            debug!("mock: object {key} up to date");
        } else {
            debug!("mock: writing object {key}");
            self.store.put_object(&key, content.as_bytes())?;
        }
        Ok(())
    }

    fn apply_plan(
        &self,
        backend: &BackendPointer,
        plan: &MockPlan,
    ) -> Result<OutputMap, EngineError> {
        let main_key = &backend.keys.main;
        let current = self.read_state(main_key)?;
        let serial = current.as_ref().map_or(0, |s| s.serial);
        if serial != plan.base_serial {
            return Err(EngineError::CommandFailed {
                command: "mock apply".to_owned(),
                status: "stale plan".to_owned(),
                stderr: format!(
                    "Saved plan is stale: planned against serial {}, state is at serial {serial}",
                    plan.base_serial
                ),
            });
        }
        if let Some(state) = &current {
            if state.vars == plan.vars {
                debug!("mock: no changes for {}", backend.env_name());
                return Ok(state.outputs.clone());
            }
        }
        self.reconcile_object(current.as_ref().map(|s| &s.vars), &plan.vars)?;
        let state = MockState {
            serial: serial + 1,
            vars: plan.vars.clone(),
            outputs: outputs_for(&plan.vars),
        };
        self.store
            .put_object(main_key, &serde_json::to_vec_pretty(&state)?)?;
        Ok(state.outputs)
    }
}

fn string_var(vars: &Map<String, Value>, name: &str) -> Option<String> {
    match vars.get(name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn outputs_for(vars: &Map<String, Value>) -> OutputMap {
    let mut outputs: OutputMap = vars
        .iter()
        .map(|(name, value)| {
            let output = OutputValue::new(value.clone());
            let output = if name.contains("secret") {
                output.sensitive()
            } else {
                output
            };
            (name.clone(), output)
        })
        .collect();
    if let Some(content) = string_var(vars, OBJECT_CONTENT_VAR) {
        let hash = blake3::hash(content.as_bytes()).to_hex().to_string();
        outputs.insert(CONTENT_HASH_OUTPUT.to_owned(), OutputValue::new(hash));
    }
    outputs
}

impl InfraEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn init(&self, _invocation: &Invocation, backend: &BackendPointer) -> Result<(), EngineError> {
        self.record(EngineCall::Init(backend.target))?;
        let mut inner = self.inner.lock().map_err(poisoned)?;
        inner.backend = Some(backend.clone());
        inner.pending = None;
        Ok(())
    }

    fn plan(&self, invocation: &Invocation) -> Result<(), EngineError> {
        self.record(EngineCall::Plan)?;
        let backend = self.backend("plan")?;
        let base_serial = self
            .read_state(&backend.keys.main)?
            .map_or(0, |s| s.serial);
        let plan = MockPlan {
            env_name: backend.env_name().to_owned(),
            vars: invocation.vars.clone(),
            base_serial,
        };
        if backend.target == StateTarget::Plan {
            debug!("mock: saving plan at {}", backend.key());
            self.store
                .put_object(backend.key(), &serde_json::to_vec_pretty(&plan)?)?;
        }
        self.inner.lock().map_err(poisoned)?.pending = Some(plan);
        Ok(())
    }

    fn apply(
        &self,
        _invocation: &Invocation,
        use_plan_file: bool,
    ) -> Result<OutputMap, EngineError> {
        self.record(EngineCall::Apply { use_plan_file })?;
        let backend = self.backend("apply")?;
        let plan = if use_plan_file {
            self.read_plan(&backend.keys.plan)?
        } else {
            self.inner
                .lock()
                .map_err(poisoned)?
                .pending
                .take()
                .ok_or_else(|| EngineError::NoPlan("no plan computed in this run".to_owned()))?
        };
        if plan.env_name != backend.env_name() {
            return Err(EngineError::NoPlan(format!(
                "plan belongs to '{}', not '{}'",
                plan.env_name,
                backend.env_name()
            )));
        }
        self.apply_plan(&backend, &plan)
    }

    fn destroy(&self, _invocation: &Invocation) -> Result<(), EngineError> {
        self.record(EngineCall::Destroy)?;
        let backend = self.backend("destroy")?;
        if let Some(state) = self.read_state(&backend.keys.main)? {
            if let Some(key) = string_var(&state.vars, OBJECT_KEY_VAR) {
                debug!("mock: removing object {key}");
                self.store.delete_object(&key)?;
            }
        }
        self.store.delete_object(&backend.keys.main)?;
        Ok(())
    }

    fn output(&self, _invocation: &Invocation) -> Result<OutputMap, EngineError> {
        self.record(EngineCall::Output)?;
        let backend = self.backend("output")?;
        Ok(self
            .read_state(&backend.keys.main)?
            .map(|s| s.outputs)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tfresource_store::{MemoryStore, StateKeys, StoreLocation};

    fn setup() -> (Arc<MemoryStore>, MockEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = MockEngine::new(Arc::clone(&store) as Arc<dyn StateStore>);
        (store, engine)
    }

    fn pointer(target: StateTarget) -> BackendPointer {
        BackendPointer {
            backend_type: "s3".to_owned(),
            backend_config: Map::new(),
            keys: StateKeys::new(&StoreLocation::new("ws", "terraform.tfstate"), "e1"),
            target,
        }
    }

    fn invocation(vars: &Value) -> Invocation {
        Invocation {
            vars: vars.as_object().cloned().unwrap(),
            ..Invocation::default()
        }
    }

    #[test]
    fn direct_apply_provisions_object() {
        let (store, engine) = setup();
        let inv = invocation(&json!({"object_key": "k1", "object_content": "c1"}));
        engine.init(&inv, &pointer(StateTarget::Main)).unwrap();
        engine.plan(&inv).unwrap();
        let outputs = engine.apply(&inv, false).unwrap();

        assert_eq!(store.get_object("k1").unwrap(), b"c1");
        assert!(store.object_exists("ws/e1/terraform.tfstate").unwrap());
        assert!(!store.object_exists("ws/e1-plan/terraform.tfstate").unwrap());
        assert_eq!(
            outputs[CONTENT_HASH_OUTPUT].value,
            Value::from(blake3::hash(b"c1").to_hex().to_string())
        );
        assert_eq!(engine.output(&inv).unwrap(), outputs);
    }

    #[test]
    fn plan_target_persists_plan() {
        let (store, engine) = setup();
        let inv = invocation(&json!({"object_key": "k1", "object_content": "c1"}));
        engine.init(&inv, &pointer(StateTarget::Plan)).unwrap();
        engine.plan(&inv).unwrap();
        assert!(store.object_exists("ws/e1-plan/terraform.tfstate").unwrap());
        assert!(!store.object_exists("k1").unwrap());

        let fresh = MockEngine::new(Arc::clone(&store) as Arc<dyn StateStore>);
        let empty = Invocation::default();
        fresh.init(&empty, &pointer(StateTarget::Main)).unwrap();
        fresh.apply(&empty, true).unwrap();
        assert_eq!(store.get_object("k1").unwrap(), b"c1");
    }

    #[test]
    fn apply_without_persisted_plan_fails() {
        let (_store, engine) = setup();
        let inv = Invocation::default();
        engine.init(&inv, &pointer(StateTarget::Main)).unwrap();
        assert!(matches!(engine.apply(&inv, true), Err(EngineError::NoPlan(_))));
    }

    #[test]
    fn unchanged_vars_do_not_rewrite() {
        let (store, engine) = setup();
        let inv = invocation(&json!({"object_key": "k1", "object_content": "c1"}));
        engine.init(&inv, &pointer(StateTarget::Main)).unwrap();
        engine.plan(&inv).unwrap();
        engine.apply(&inv, false).unwrap();
        let object_time = store.last_modified("k1").unwrap();
        let state_time = store.last_modified("ws/e1/terraform.tfstate").unwrap();

        engine.init(&inv, &pointer(StateTarget::Main)).unwrap();
        engine.plan(&inv).unwrap();
        engine.apply(&inv, false).unwrap();
        assert_eq!(store.last_modified("k1").unwrap(), object_time);
        assert_eq!(
            store.last_modified("ws/e1/terraform.tfstate").unwrap(),
            state_time
        );
    }

    #[test]
    fn moving_object_deletes_old_key() {
        let (store, engine) = setup();
        for vars in [
            json!({"object_key": "k1", "object_content": "c1"}),
            json!({"object_key": "k2", "object_content": "c1"}),
        ] {
            let inv = invocation(&vars);
            engine.init(&inv, &pointer(StateTarget::Main)).unwrap();
            engine.plan(&inv).unwrap();
            engine.apply(&inv, false).unwrap();
        }
        assert!(!store.object_exists("k1").unwrap());
        assert_eq!(store.get_object("k2").unwrap(), b"c1");
    }

    #[test]
    fn stale_plan_is_rejected() {
        let (store, engine) = setup();
        let planned = invocation(&json!({"object_content": "a"}));
        engine.init(&planned, &pointer(StateTarget::Plan)).unwrap();
        engine.plan(&planned).unwrap();

        let direct = invocation(&json!({"object_content": "b"}));
        engine.init(&direct, &pointer(StateTarget::Main)).unwrap();
        engine.plan(&direct).unwrap();
        engine.apply(&direct, false).unwrap();

        engine.init(&planned, &pointer(StateTarget::Main)).unwrap();
        let err = engine.apply(&planned, true).unwrap_err();
        assert!(err.to_string().contains("stale"));
        assert!(store.object_exists("ws/e1-plan/terraform.tfstate").unwrap());
    }

    #[test]
    fn destroy_removes_object_and_state() {
        let (store, engine) = setup();
        let inv = invocation(&json!({"object_key": "k1", "object_content": "c1"}));
        engine.init(&inv, &pointer(StateTarget::Main)).unwrap();
        engine.plan(&inv).unwrap();
        engine.apply(&inv, false).unwrap();
        engine.destroy(&inv).unwrap();
        assert!(store.keys().is_empty());
        assert!(engine.output(&inv).unwrap().is_empty());
    }

    #[test]
    fn secret_outputs_are_sensitive() {
        let outputs = outputs_for(
            json!({"db_secret": "x", "region": "eu"})
                .as_object()
                .unwrap(),
        );
        assert!(outputs["db_secret"].sensitive);
        assert!(!outputs["region"].sensitive);
        assert!(!outputs.contains_key(CONTENT_HASH_OUTPUT));
    }

    #[test]
    fn calls_before_init_fail() {
        let (_store, engine) = setup();
        let inv = Invocation::default();
        assert!(matches!(
            engine.plan(&inv),
            Err(EngineError::NotInitialized("plan"))
        ));
    }

    #[test]
    fn injected_failure_is_recorded() {
        let (_store, engine) = setup();
        engine.fail_on(EngineStep::Plan).unwrap();
        let inv = Invocation::default();
        engine.init(&inv, &pointer(StateTarget::Main)).unwrap();
        assert!(matches!(engine.plan(&inv), Err(EngineError::Injected(_))));
        assert_eq!(
            engine.calls().unwrap(),
            vec![EngineCall::Init(StateTarget::Main), EngineCall::Plan]
        );
    }

    #[test]
    fn poisoned_call_log_is_an_error() {
        let (_store, engine) = setup();
        let engine = Arc::new(engine);
        let holder = Arc::clone(&engine);
        let joined = std::thread::spawn(move || {
            let _guard = holder.inner.lock().unwrap();
            panic!("poison the call log");
        })
        .join();
        assert!(joined.is_err());

        assert!(matches!(engine.calls(), Err(EngineError::Io(_))));
        assert!(engine.fail_on(EngineStep::Apply).is_err());
        assert!(engine.init(&Invocation::default(), &pointer(StateTarget::Main)).is_err());
    }
}
