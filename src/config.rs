//! YAML / JSON configuration for hyperhash schemas.
//!
//! A configuration file names one or more schemas. Each schema fixes the
//! discretization parameters for a family of vectors together with the hash
//! strategy used to key them, so that writers and readers of an external index
//! agree on both.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "image search"
//!
//! schemas:
//!   thumbnails:
//!     num_buckets: 10
//!     min: 0.0
//!     max: 255.0
//!     eps_percent: 0.25
//!     hash:
//!       kind: decimal
//!   embeddings:
//!     num_buckets: 64
//!     min: -1.0
//!     max: 1.0
//!     eps_percent: 0.1
//!     hash:
//!       kind: xxh3
//!       seed: 42
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use hypercube::{CubeHasher, DECIMAL_MAX_BUCKETS, HashStrategy, HyperError, HyperParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("unknown schema: {0}")]
    UnknownSchema(String),
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct HyperConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    /// Named schemas, keyed by schema name
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaConfig>,
}

impl HyperConfig {
    /// Load a configuration file. `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: HyperConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON configuration from a string
    pub fn from_json(json: &str) -> Result<Self, ConfigLoadError> {
        let config: HyperConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Resolve a schema by name into ready-to-use params and hasher.
    pub fn schema(&self, name: &str) -> Result<Schema, ConfigLoadError> {
        let cfg = self
            .schemas
            .get(name)
            .ok_or_else(|| ConfigLoadError::UnknownSchema(name.to_string()))?;
        cfg.resolve(name)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        if self.schemas.is_empty() {
            return Err(ConfigLoadError::Validation(
                "at least one schema must be defined".to_string(),
            ));
        }

        for (name, schema) in &self.schemas {
            schema.validate(name)?;
        }

        Ok(())
    }
}

impl Default for HyperConfig {
    fn default() -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert("default".to_string(), SchemaConfig::default());
        Self {
            version: "1.0".to_string(),
            name: None,
            schemas,
        }
    }
}

/// One schema: discretization parameters plus hash strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaConfig {
    #[serde(default = "default_num_buckets")]
    pub num_buckets: usize,

    #[serde(default)]
    pub min: f64,

    #[serde(default = "default_max")]
    pub max: f64,

    #[serde(default = "default_eps_percent")]
    pub eps_percent: f64,

    #[serde(default)]
    pub hash: HashStrategy,
}

impl SchemaConfig {
    pub fn params(&self) -> HyperParams {
        HyperParams {
            num_buckets: self.num_buckets,
            min: self.min,
            max: self.max,
            eps_percent: self.eps_percent,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigLoadError> {
        self.params()
            .validate()
            .map_err(|err| schema_error(name, &err))?;

        if self.hash == HashStrategy::Decimal && self.num_buckets > DECIMAL_MAX_BUCKETS {
            return Err(ConfigLoadError::Validation(format!(
                "schemas.{name}.hash: decimal requires num_buckets <= {DECIMAL_MAX_BUCKETS} (got {})",
                self.num_buckets
            )));
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<Schema, ConfigLoadError> {
        let params = self.params();
        let hasher = self
            .hash
            .build(&params)
            .map_err(|err| schema_error(name, &err))?;
        Ok(Schema {
            name: name.to_string(),
            params,
            strategy: self.hash,
            hasher,
        })
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        let params = HyperParams::default();
        Self {
            num_buckets: params.num_buckets,
            min: params.min,
            max: params.max,
            eps_percent: params.eps_percent,
            hash: HashStrategy::default(),
        }
    }
}

/// A resolved schema, shareable across threads.
pub struct Schema {
    pub name: String,
    pub params: HyperParams,
    pub strategy: HashStrategy,
    pub hasher: Box<dyn CubeHasher>,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("strategy", &self.strategy)
            .finish()
    }
}

fn schema_error(name: &str, err: &HyperError) -> ConfigLoadError {
    ConfigLoadError::Validation(format!("schemas.{name}: {err}"))
}

// Helper functions for serde defaults
fn default_num_buckets() -> usize {
    10
}
fn default_max() -> f64 {
    255.0
}
fn default_eps_percent() -> f64 {
    0.25
}
