use serde::{Deserialize, Serialize};

/// Version reported back to the pipeline.
///
/// `plan_only` is `"true"` for a plan that has not been applied and empty
/// otherwise. `last_modified` is only set for plan-only versions so that
/// repeated plans of the same environment remain distinct.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    pub env_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_only: String,
    #[serde(
        default,
        rename = "lastmodified",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<String>,
}

impl Version {
    pub fn is_plan_only(&self) -> bool {
        self.plan_only == "true"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

impl MetadataField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutResponse {
    pub version: Version,
    pub metadata: Vec<MetadataField>,
}

impl OutResponse {
    /// Look up a metadata value by name.
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}
