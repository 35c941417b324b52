//! Output settings for the C++ emitter.
//!
//! Every field has a default, so a YAML file only needs the keys it overrides:
//!
//! ```yaml
//! includes: ["<iostream>", "runtime/value.hpp"]
//! indent_width: 2
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranspileConfig {
    /// Include targets in emission order. `<...>` targets become system includes.
    pub includes: Vec<String>,
    pub indent_width: usize,
    /// Prefix for compiler-generated temporaries.
    pub temp_prefix: String,
}

impl Default for TranspileConfig {
    fn default() -> Self {
        Self {
            includes: vec![
                "<iostream>".to_string(),
                "<functional>".to_string(),
                "library/value.hpp".to_string(),
                "library/range.hpp".to_string(),
                "library/booleans.hpp".to_string(),
            ],
            indent_width: 4,
            temp_prefix: "_tmp".to_string(),
        }
    }
}

impl TranspileConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let prefix_is_identifier = self
            .temp_prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && self
                .temp_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !prefix_is_identifier {
            return Err(ConfigError::Invalid(format!(
                "temp_prefix '{}' is not a C++ identifier",
                self.temp_prefix
            )));
        }
        if self.includes.iter().any(|include| include.trim().is_empty()) {
            return Err(ConfigError::Invalid("includes may not be empty".to_string()));
        }
        Ok(())
    }
}
