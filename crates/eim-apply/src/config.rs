use eim_core::{DispatchConfig, FailurePolicy, UnknownSchemaPolicy};

/// Dispatch defaults loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `EIM_UNKNOWN_SCHEMA`: `skip` (default) or `reject`
    /// - `EIM_FAILURE_POLICY`: `stop` (default) or `skip-record`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut dispatch = DispatchConfig::default();

        if let Some(value) = lookup("EIM_UNKNOWN_SCHEMA") {
            dispatch.unknown_schema = match value.trim().to_ascii_lowercase().as_str() {
                "skip" => UnknownSchemaPolicy::Skip,
                "reject" => UnknownSchemaPolicy::Reject,
                _ => return Err(ConfigError::InvalidUnknownSchema(value)),
            };
        }
        if let Some(value) = lookup("EIM_FAILURE_POLICY") {
            dispatch.on_failure = match value.trim().to_ascii_lowercase().as_str() {
                "stop" => FailurePolicy::Stop,
                "skip-record" => FailurePolicy::SkipRecord,
                _ => return Err(ConfigError::InvalidFailurePolicy(value)),
            };
        }

        Ok(Self { dispatch })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("EIM_UNKNOWN_SCHEMA must be 'skip' or 'reject', got '{0}'")]
    InvalidUnknownSchema(String),
    #[error("EIM_FAILURE_POLICY must be 'stop' or 'skip-record', got '{0}'")]
    InvalidFailurePolicy(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.dispatch, DispatchConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[("EIM_UNKNOWN_SCHEMA", "Reject"), ("EIM_FAILURE_POLICY", "skip-record")]).unwrap();
        assert_eq!(config.dispatch.unknown_schema, UnknownSchemaPolicy::Reject);
        assert_eq!(config.dispatch.on_failure, FailurePolicy::SkipRecord);
    }

    #[test]
    fn test_invalid_value() {
        assert!(matches!(
            config(&[("EIM_FAILURE_POLICY", "retry")]),
            Err(ConfigError::InvalidFailurePolicy(_))
        ));
    }
}
