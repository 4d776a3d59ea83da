use crate::engine::{BackendPointer, InfraEngine, Invocation, OutputMap};
use crate::EngineError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tfresource_store::StateTarget;
use tracing::{debug, info, warn};

const BACKEND_OVERRIDE_FILE: &str = "tfresource_backend_override.tf";
const PLAN_FILE: &str = "tfresource.tfplan";
/// Output of the synthetic plan-workspace state that carries the plan.
pub const ENCODED_PLAN_OUTPUT: &str = "encoded_plan";
const DEFAULT_WORKSPACE: &str = "default";

/// Engine that drives the `terraform` CLI.
///
/// Environments map to Terraform workspaces: `<env>` holds the real state and
/// `<env>-plan` holds a synthetic state whose only output is the saved plan,
/// base64 encoded. Workspaces are what place state at
/// `<workspace_prefix>/<workspace>/<key>` in the backend.
pub struct TerraformCli {
    binary: String,
    backend: Mutex<Option<BackendPointer>>,
}

impl TerraformCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            backend: Mutex::new(None),
        }
    }

    fn current(&self, step: &'static str) -> Result<BackendPointer, EngineError> {
        self.backend
            .lock()
            .map_err(crate::poisoned)?
            .clone()
            .ok_or(EngineError::NotInitialized(step))
    }

    fn run(&self, invocation: &Invocation, args: &[String]) -> Result<Vec<u8>, EngineError> {
        // Backend settings may carry credentials; keep them out of logs and errors.
        let shown: Vec<&str> = args
            .iter()
            .map(String::as_str)
            .filter(|a| !a.starts_with("-backend-config="))
            .collect();
        let shown_cmd = format!("{} {}", self.binary, shown.join(" "));
        debug!("running {shown_cmd}");

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    EngineError::Unavailable(format!("{} ({e})", self.binary))
                } else {
                    EngineError::Io(e)
                }
            })?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!("{line}");
        }
        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                command: shown_cmd,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(output.stdout)
    }

    fn run_args(&self, invocation: &Invocation, args: &[&str]) -> Result<Vec<u8>, EngineError> {
        let owned: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
        self.run(invocation, &owned)
    }

    fn select_workspace(&self, invocation: &Invocation, workspace: &str) -> Result<(), EngineError> {
        self.run_args(
            invocation,
            &["workspace", "select", "-or-create=true", workspace],
        )?;
        Ok(())
    }

    fn plan_file(invocation: &Invocation) -> PathBuf {
        invocation.working_dir.join(".terraform").join(PLAN_FILE)
    }

    /// `-var-file` arguments; the returned temp file must outlive the command.
    fn var_args(
        invocation: &Invocation,
    ) -> Result<(Option<NamedTempFile>, Vec<String>), EngineError> {
        let mut args = Vec::new();
        let tmp = if invocation.vars.is_empty() {
            None
        } else {
            let mut tmp = tempfile::Builder::new()
                .prefix("tfresource-")
                .suffix(".tfvars.json")
                .tempfile()?;
            serde_json::to_writer(&mut tmp, &invocation.vars)?;
            tmp.flush()?;
            args.push(format!("-var-file={}", tmp.path().display()));
            Some(tmp)
        };
        for file in &invocation.var_files {
            args.push(format!("-var-file={}", file.display()));
        }
        Ok((tmp, args))
    }

    fn pull_state(&self, invocation: &Invocation) -> Result<Option<Value>, EngineError> {
        let stdout = self.run_args(invocation, &["state", "pull"])?;
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&stdout)?))
    }

    fn terraform_version(&self, invocation: &Invocation) -> Result<String, EngineError> {
        let stdout = self.run_args(invocation, &["version", "-json"])?;
        let parsed: Value = serde_json::from_slice(&stdout)?;
        parsed["terraform_version"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| EngineError::MalformedOutput("terraform version -json".to_owned()))
    }

    /// Store the saved plan in the plan workspace as a state output.
    fn persist_plan(
        &self,
        invocation: &Invocation,
        pointer: &BackendPointer,
        plan: &[u8],
    ) -> Result<(), EngineError> {
        let version = self.terraform_version(invocation)?;
        self.select_workspace(invocation, &pointer.keys.workspace(StateTarget::Plan))?;
        let existing = self.pull_state(invocation)?;
        let serial = existing
            .as_ref()
            .and_then(|s| s["serial"].as_u64())
            .unwrap_or(0);
        let lineage = existing
            .as_ref()
            .and_then(|s| s["lineage"].as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("tfresource-{}", pointer.keys.workspace(StateTarget::Plan)));

        let mut outputs = serde_json::Map::new();
        outputs.insert(
            ENCODED_PLAN_OUTPUT.to_owned(),
            json!({ "value": BASE64.encode(plan), "type": "string" }),
        );
        let state = json!({
            "version": 4,
            "terraform_version": version,
            "serial": serial + 1,
            "lineage": lineage,
            "outputs": outputs,
            "resources": []
        });
        let mut tmp = tempfile::Builder::new()
            .prefix("tfresource-plan-")
            .suffix(".tfstate")
            .tempfile()?;
        serde_json::to_writer(&mut tmp, &state)?;
        tmp.flush()?;
        self.run(
            invocation,
            &[
                "state".to_owned(),
                "push".to_owned(),
                "-force".to_owned(),
                tmp.path().display().to_string(),
            ],
        )?;
        info!("stored plan in workspace {}", pointer.keys.workspace(StateTarget::Plan));
        Ok(())
    }

    fn fetch_plan(
        &self,
        invocation: &Invocation,
        pointer: &BackendPointer,
    ) -> Result<Vec<u8>, EngineError> {
        let workspace = pointer.keys.workspace(StateTarget::Plan);
        self.run_args(invocation, &["workspace", "select", &workspace])?;
        let state = self
            .pull_state(invocation)?
            .ok_or_else(|| EngineError::NoPlan(format!("workspace {workspace} is empty")))?;
        let encoded = state["outputs"][ENCODED_PLAN_OUTPUT]["value"]
            .as_str()
            .ok_or_else(|| {
                EngineError::NoPlan(format!("workspace {workspace} has no plan output"))
            })?;
        BASE64
            .decode(encoded)
            .map_err(|e| EngineError::MalformedOutput(format!("encoded plan: {e}")))
    }
}

/// Render a backend config value for `-backend-config=key=value`.
fn backend_config_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => hcl_literal(other),
    }
}

fn hcl_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(hcl_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k} = {}", hcl_literal(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn write_backend_override(working_dir: &Path, backend_type: &str) -> Result<(), EngineError> {
    let content = format!("terraform {{\n  backend \"{backend_type}\" {{}}\n}}\n");
    std::fs::write(working_dir.join(BACKEND_OVERRIDE_FILE), content)?;
    Ok(())
}

fn discard_plan_file(plan_file: &Path) {
    match std::fs::remove_file(plan_file) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove {}: {e}", plan_file.display()),
    }
}

impl InfraEngine for TerraformCli {
    fn name(&self) -> &'static str {
        "terraform"
    }

    fn init(&self, invocation: &Invocation, backend: &BackendPointer) -> Result<(), EngineError> {
        write_backend_override(&invocation.working_dir, &backend.backend_type)?;

        let mut args = vec![
            "init".to_owned(),
            "-input=false".to_owned(),
            "-reconfigure".to_owned(),
        ];
        for (key, value) in &backend.backend_config {
            args.push(format!("-backend-config={key}={}", backend_config_value(value)));
        }
        self.run(invocation, &args)?;
        // The plan workspace is only created once a plan exists to store in it.
        self.select_workspace(invocation, &backend.keys.workspace(StateTarget::Main))?;

        *self.backend.lock().map_err(crate::poisoned)? = Some(backend.clone());
        Ok(())
    }

    fn plan(&self, invocation: &Invocation) -> Result<(), EngineError> {
        let pointer = self.current("plan")?;
        let plan_file = Self::plan_file(invocation);
        let (_vars_file, var_args) = Self::var_args(invocation)?;
        let mut args = vec![
            "plan".to_owned(),
            "-input=false".to_owned(),
            format!("-out={}", plan_file.display()),
        ];
        args.extend(var_args);
        self.run(invocation, &args)?;

        if pointer.target == StateTarget::Plan {
            let plan = std::fs::read(&plan_file)?;
            self.persist_plan(invocation, &pointer, &plan)?;
        }
        Ok(())
    }

    fn apply(
        &self,
        invocation: &Invocation,
        use_plan_file: bool,
    ) -> Result<OutputMap, EngineError> {
        let pointer = self.current("apply")?;
        let plan_file = Self::plan_file(invocation);
        if use_plan_file {
            let plan = self.fetch_plan(invocation, &pointer)?;
            if let Some(parent) = plan_file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&plan_file, plan)?;
            self.select_workspace(invocation, &pointer.keys.workspace(StateTarget::Main))?;
        } else if !plan_file.is_file() {
            return Err(EngineError::NoPlan(format!(
                "{} was not produced by a plan in this run",
                plan_file.display()
            )));
        }

        self.run(
            invocation,
            &[
                "apply".to_owned(),
                "-input=false".to_owned(),
                "-auto-approve".to_owned(),
                plan_file.display().to_string(),
            ],
        )?;
        discard_plan_file(&plan_file);
        self.output(invocation)
    }

    fn destroy(&self, invocation: &Invocation) -> Result<(), EngineError> {
        let pointer = self.current("destroy")?;
        let (_vars_file, var_args) = Self::var_args(invocation)?;
        let mut args = vec![
            "destroy".to_owned(),
            "-input=false".to_owned(),
            "-auto-approve".to_owned(),
        ];
        args.extend(var_args);
        self.run(invocation, &args)?;

        let workspace = pointer.keys.workspace(StateTarget::Main);
        self.run_args(invocation, &["workspace", "select", DEFAULT_WORKSPACE])?;
        self.run_args(invocation, &["workspace", "delete", &workspace])?;
        info!("deleted workspace {workspace}");
        Ok(())
    }

    fn output(&self, invocation: &Invocation) -> Result<OutputMap, EngineError> {
        let stdout = self.run_args(invocation, &["output", "-json"])?;
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(OutputMap::new());
        }
        serde_json::from_slice(&stdout)
            .map_err(|e| EngineError::MalformedOutput(format!("terraform output -json: {e}")))
    }
}
