use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::domain::error::EngineError;

pub const ENV_PREFIX: &str = "CONTENT_ENGINE__";

/// Configuration for the content engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Application key exposed to hooks and handlers.
    pub key: String,
    /// List limit used when a request does not set one.
    pub default_list_limit: usize,
    /// Upper bound for any requested list limit.
    pub max_list_limit: usize,
    /// Refuse to build unless every (resource, action) pair has a handler.
    pub require_handler_completeness: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key: "content-engine".to_owned(),
            default_list_limit: 20,
            max_list_limit: 100,
            require_handler_completeness: true,
        }
    }
}

impl EngineConfig {
    /// Layer defaults, the optional YAML file and `CONTENT_ENGINE__*`
    /// environment variables, in that order.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] if extraction or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| EngineError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// [`EngineError::Config`] for an empty key or inconsistent list limits.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.key.trim().is_empty() {
            return Err(EngineError::config("key must not be empty"));
        }
        if self.default_list_limit == 0 {
            return Err(EngineError::config("default_list_limit must be positive"));
        }
        if self.default_list_limit > self.max_list_limit {
            return Err(EngineError::config(format!(
                "default_list_limit ({}) exceeds max_list_limit ({})",
                self.default_list_limit, self.max_list_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_list_limit, 20);
        assert_eq!(config.max_list_limit, 100);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "key: blog\nmax_list_limit: 500").unwrap();
        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.key, "blog");
        assert_eq!(config.max_list_limit, 500);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_list_limitt: 5").unwrap();
        let err = EngineConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("engine.yaml", "default_list_limit: 10")?;
            jail.set_env("CONTENT_ENGINE__DEFAULT_LIST_LIMIT", "30");
            let config = EngineConfig::load(Some(Path::new("engine.yaml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.default_list_limit, 30);
            Ok(())
        });
    }

    #[test]
    fn inconsistent_limits_fail_validation() {
        let config = EngineConfig {
            default_list_limit: 200,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }
}
