use crate::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Read;

/// Requested lifecycle action. Plan flags refine `Create` further.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    #[serde(alias = "")]
    Create,
    Destroy,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Destroy => write!(f, "destroy"),
        }
    }
}

/// Terraform settings shared by `source` and `params`.
///
/// Both levels carry the same fields; `params` values override `source`
/// defaults via [`Terraform::merged`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Terraform {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backend_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub backend_config: Map<String, Value>,
    /// Directory holding the Terraform configuration, relative to the
    /// pipeline's source directory.
    #[serde(
        default,
        rename = "terraform_source",
        skip_serializing_if = "String::is_empty"
    )]
    pub source: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub plan_only: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub plan_run: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vars: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub var_files: Vec<String>,
}

impl Terraform {
    /// Layer `overrides` on top of `self`.
    ///
    /// Scalars from `overrides` win when non-empty, maps are merged key by key
    /// with `overrides` winning, var files are appended. Plan flags are taken
    /// from `overrides` only.
    #[must_use]
    pub fn merged(&self, overrides: &Terraform) -> Terraform {
        let mut out = self.clone();
        if !overrides.backend_type.is_empty() {
            out.backend_type.clone_from(&overrides.backend_type);
        }
        for (k, v) in &overrides.backend_config {
            out.backend_config.insert(k.clone(), v.clone());
        }
        if !overrides.source.is_empty() {
            out.source.clone_from(&overrides.source);
        }
        out.plan_only = overrides.plan_only;
        out.plan_run = overrides.plan_run;
        out.env
            .extend(overrides.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (k, v) in &overrides.vars {
            out.vars.insert(k.clone(), v.clone());
        }
        out.var_files.extend(overrides.var_files.iter().cloned());
        out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Source {
    #[serde(flatten)]
    pub terraform: Terraform,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutParams {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub env_name: String,
    /// File (relative to the source directory) holding the environment name.
    /// Consulted only when `env_name` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_name_file: Option<String>,
    #[serde(default)]
    pub action: Action,
    #[serde(flatten)]
    pub terraform: Terraform,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutRequest {
    pub source: Source,
    #[serde(default)]
    pub params: OutParams,
}

impl OutRequest {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, SchemaError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// The effective Terraform settings: source defaults overlaid with params.
    pub fn terraform(&self) -> Terraform {
        self.source.terraform.merged(&self.params.terraform)
    }
}
