//! CLI subprocess integration tests.
//!
//! These tests invoke the `tfresource` binary with the mock engine against
//! the local backend and check exit codes, stdout JSON and the files left in
//! the source directory.

use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const MAIN_STATE: &str = "tf/terraform.tfstate.d/e1/terraform.tfstate";
const PLAN_STATE: &str = "tf/terraform.tfstate.d/e1-plan/terraform.tfstate";

fn tfresource_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tfresource"));
    cmd.env("TFRESOURCE_ENGINE", "mock");
    cmd.env_remove("TFRESOURCE_LOG");
    cmd
}

fn run_out(source_dir: &Path, request: &Value) -> Output {
    let mut child = tfresource_bin()
        .arg("out")
        .arg(source_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(request.to_string().as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn request(params: &Value) -> Value {
    json!({
        "source": { "backend_type": "local" },
        "params": params
    })
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "tfresource failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn metadata_value<'a>(response: &'a Value, name: &str) -> Option<&'a str> {
    response["metadata"]
        .as_array()?
        .iter()
        .find(|f| f["name"] == name)
        .and_then(|f| f["value"].as_str())
}

#[test]
fn cli_help_lists_out() {
    let output = tfresource_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("out"), "help must list 'out': {stdout}");
}

#[test]
fn cli_plan_only_then_plan_run() {
    let src = tempfile::tempdir().unwrap();

    let planned = stdout_json(&run_out(
        src.path(),
        &request(&json!({
            "env_name": "e1",
            "terraform_source": "tf",
            "plan_only": true,
            "vars": { "object_key": "k1", "object_content": "c1" }
        })),
    ));
    assert_eq!(planned["version"]["env_name"], "e1");
    assert_eq!(planned["version"]["plan_only"], "true");
    assert!(planned["version"]["lastmodified"].is_string());
    assert_eq!(planned["metadata"].as_array().unwrap().len(), 1);
    assert!(src.path().join(PLAN_STATE).is_file());
    assert!(!src.path().join("tf/k1").exists());

    let applied = stdout_json(&run_out(
        src.path(),
        &request(&json!({
            "env_name": "e1",
            "terraform_source": "tf",
            "plan_run": true
        })),
    ));
    assert_eq!(applied["version"], json!({ "env_name": "e1" }));
    assert_eq!(metadata_value(&applied, "env_name"), Some("e1"));
    let expected_hash = blake3::hash(b"c1").to_hex().to_string();
    assert_eq!(
        metadata_value(&applied, "content_hash"),
        Some(expected_hash.as_str())
    );
    assert!(!src.path().join(PLAN_STATE).exists());
    assert!(src.path().join(MAIN_STATE).is_file());
    assert_eq!(std::fs::read(src.path().join("tf/k1")).unwrap(), b"c1");
}

#[test]
fn cli_request_from_file_with_env_name_file() {
    let src = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("name"), "e1\n").unwrap();
    let request_path = src.path().join("request.json");
    std::fs::write(
        &request_path,
        request(&json!({
            "env_name_file": "name",
            "terraform_source": "tf",
            "vars": { "object_key": "k1", "object_content": "c1" }
        }))
        .to_string(),
    )
    .unwrap();

    let output = tfresource_bin()
        .arg("out")
        .arg(src.path())
        .arg("--request")
        .arg(&request_path)
        .stdin(Stdio::null())
        .output()
        .unwrap();
    let response = stdout_json(&output);
    assert_eq!(response["version"]["env_name"], "e1");
    assert!(src.path().join(MAIN_STATE).is_file());
}

#[test]
fn cli_destroy_cleans_up() {
    let src = tempfile::tempdir().unwrap();
    let create = request(&json!({
        "env_name": "e1",
        "terraform_source": "tf",
        "vars": { "object_key": "k1", "object_content": "c1" }
    }));
    stdout_json(&run_out(src.path(), &create));
    assert!(src.path().join("tf/k1").is_file());

    let destroyed = stdout_json(&run_out(
        src.path(),
        &request(&json!({
            "env_name": "e1",
            "terraform_source": "tf",
            "action": "destroy"
        })),
    ));
    assert_eq!(destroyed["version"], json!({ "env_name": "e1" }));
    assert!(!src.path().join("tf/k1").exists());
    assert!(!src.path().join(MAIN_STATE).exists());
    assert!(!src.path().join(PLAN_STATE).exists());
}

#[test]
fn cli_conflicting_flags_exit_invalid_request() {
    let src = tempfile::tempdir().unwrap();
    let output = run_out(
        src.path(),
        &request(&json!({
            "env_name": "e1",
            "terraform_source": "tf",
            "plan_only": true,
            "plan_run": true
        })),
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid request"), "stderr: {stderr}");
    assert!(!src.path().join("tf").exists());
}

#[test]
fn cli_malformed_json_exit_invalid_request() {
    let src = tempfile::tempdir().unwrap();
    let mut child = tfresource_bin()
        .arg("out")
        .arg(src.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"{ not json")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_plan_run_without_plan_exit_missing_plan() {
    let src = tempfile::tempdir().unwrap();
    let output = run_out(
        src.path(),
        &request(&json!({
            "env_name": "e1",
            "terraform_source": "tf",
            "plan_run": true
        })),
    );
    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());
    assert!(!src.path().join(MAIN_STATE).exists());
}

#[test]
fn cli_unknown_engine_exit_invalid_request() {
    let src = tempfile::tempdir().unwrap();
    let request_path = src.path().join("request.json");
    std::fs::write(
        &request_path,
        request(&json!({ "env_name": "e1", "terraform_source": "tf" })).to_string(),
    )
    .unwrap();
    let output = tfresource_bin()
        .env("TFRESOURCE_ENGINE", "pulumi")
        .arg("out")
        .arg(src.path())
        .arg("--request")
        .arg(&request_path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown engine 'pulumi'"), "stderr: {stderr}");
}

#[test]
fn cli_missing_request_file_exit_invalid_request() {
    let src = tempfile::tempdir().unwrap();
    let output = tfresource_bin()
        .arg("out")
        .arg(src.path())
        .arg("--request")
        .arg(src.path().join("missing.json"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_logs_go_to_stderr() {
    let src = tempfile::tempdir().unwrap();
    let output = run_out(
        src.path(),
        &request(&json!({
            "env_name": "e1",
            "terraform_source": "tf"
        })),
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(serde_json::from_str::<Value>(&stdout).is_ok(), "stdout: {stdout}");
    assert!(stderr.contains("create for environment e1"), "stderr: {stderr}");
}

#[test]
fn cli_s3_backend_is_built_in() {
    let src = tempfile::tempdir().unwrap();
    let output = run_out(
        src.path(),
        &json!({
            "source": { "backend_type": "s3", "backend_config": { "region": "eu-west-1" } },
            "params": { "env_name": "e1", "terraform_source": "tf" }
        }),
    );
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("s3 backend requires 'bucket'"),
        "stderr: {stderr}"
    );
    assert!(!stderr.contains("built without"), "stderr: {stderr}");
}
