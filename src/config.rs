//! Engine tunables, loaded from a small TOML file.
//!
//! ```toml
//! [interpreter]
//! max_call_depth = 8
//! instruction_limit = 1000000
//! ```
//!
//! Every field is optional; a missing file means all defaults.

use crate::interpreter::DEFAULT_MAX_CALL_DEPTH;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Bound on gosub nesting.
    pub max_call_depth: usize,
    /// Dispatch-count ceiling per run; `None` runs unbounded.
    pub instruction_limit: Option<u64>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            instruction_limit: Some(1_000_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub interpreter: InterpreterConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// As `load`, but an absent file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match EngineConfig::load(path) {
            Ok(config) => Ok(config),
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(EngineConfig::default())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.interpreter.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.interpreter.instruction_limit, Some(1_000_000));
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let config: EngineConfig = toml::from_str("[interpreter]\nmax_call_depth = 3\n").unwrap();
        assert_eq!(config.interpreter.max_call_depth, 3);
        assert_eq!(config.interpreter.instruction_limit, Some(1_000_000));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn missing_file_is_all_defaults() {
        let config =
            EngineConfig::load_or_default(Path::new("definitely/not/here.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
