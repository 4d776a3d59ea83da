use crate::SchemaError;

/// Suffix appended to an environment name to form its plan workspace.
pub const PLAN_SUFFIX: &str = "-plan";

const MAX_ENV_NAME_LEN: usize = 128;

/// Validate an environment name before it is used to derive backend keys.
///
/// Names ending in [`PLAN_SUFFIX`] are rejected: the main key of `foo-plan`
/// would otherwise be the plan key of `foo`.
pub fn validate_env_name(name: &str) -> Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidEnvName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    if name.is_empty() || name.len() > MAX_ENV_NAME_LEN {
        return Err(invalid("must be 1-128 characters"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(invalid("must match [a-zA-Z0-9_.-]"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if name.ends_with(PLAN_SUFFIX) {
        return Err(invalid("must not end with '-plan'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        assert!(validate_env_name("staging").is_ok());
        assert!(validate_env_name("out-test-a1b2c3").is_ok());
        assert!(validate_env_name("team_1.prod").is_ok());
        assert!(validate_env_name(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn rejects_empty_and_too_long() {
        assert!(validate_env_name("").is_err());
        assert!(validate_env_name(&"x".repeat(129)).is_err());
    }

    #[test]
    fn rejects_path_separators_and_spaces() {
        assert!(validate_env_name("a/b").is_err());
        assert!(validate_env_name("has space").is_err());
        assert!(validate_env_name("..").is_err());
    }

    #[test]
    fn rejects_plan_suffix() {
        let err = validate_env_name("prod-plan").unwrap_err();
        assert!(err.to_string().contains("-plan"));
        assert!(validate_env_name("planner").is_ok());
    }
}
