use serde_json::Value;
use tfresource_engine::OutputMap;
use tfresource_schema::MetadataField;

pub const ENV_NAME_FIELD: &str = "env_name";
/// Reported in place of sensitive output values.
pub const SENSITIVE_PLACEHOLDER: &str = "<sensitive>";

/// Flatten engine outputs into reported metadata, `env_name` first.
pub fn extract_metadata(env_name: &str, outputs: &OutputMap) -> Vec<MetadataField> {
    let mut fields = Vec::with_capacity(outputs.len() + 1);
    fields.push(MetadataField::new(ENV_NAME_FIELD, env_name));
    for (name, output) in outputs {
        if name == ENV_NAME_FIELD {
            continue;
        }
        let value = if output.sensitive {
            SENSITIVE_PLACEHOLDER.to_owned()
        } else {
            match &output.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        };
        fields.push(MetadataField::new(name.as_str(), value));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tfresource_engine::OutputValue;

    #[test]
    fn env_name_first_then_engine_order() {
        let mut outputs = OutputMap::new();
        outputs.insert("zeta".to_owned(), OutputValue::new("z"));
        outputs.insert("alpha".to_owned(), OutputValue::new("a"));
        let fields = extract_metadata("e1", &outputs);
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["env_name", "zeta", "alpha"]);
        assert_eq!(fields[0].value, "e1");
    }

    #[test]
    fn non_strings_are_compact_json() {
        let mut outputs = OutputMap::new();
        outputs.insert("count".to_owned(), OutputValue::new(3));
        outputs.insert("tags".to_owned(), OutputValue::new(json!({"a": [1, true]})));
        outputs.insert("nothing".to_owned(), OutputValue::new(Value::Null));
        let fields = extract_metadata("e1", &outputs);
        assert_eq!(fields[1].value, "3");
        assert_eq!(fields[2].value, r#"{"a":[1,true]}"#);
        assert_eq!(fields[3].value, "null");
    }

    #[test]
    fn sensitive_values_are_masked() {
        let mut outputs = OutputMap::new();
        outputs.insert("password".to_owned(), OutputValue::new("hunter2").sensitive());
        let fields = extract_metadata("e1", &outputs);
        assert_eq!(fields[1].value, SENSITIVE_PLACEHOLDER);
    }

    #[test]
    fn injected_env_name_wins() {
        let mut outputs = OutputMap::new();
        outputs.insert("env_name".to_owned(), OutputValue::new("other"));
        let fields = extract_metadata("e1", &outputs);
        assert_eq!(fields, vec![MetadataField::new("env_name", "e1")]);
    }
}
