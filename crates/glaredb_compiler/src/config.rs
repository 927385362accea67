use glaredb_error::{DbError, Result, ResultExt};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 2048;

/// Configuration for compiling pipelines.
///
/// These only gate the execution mode reported to the runtime. A pipeline's
/// own vectorizable/parallelizable flags are always derived from its
/// operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Allow pipelines to process batches of rows when all operators support
    /// it.
    pub enable_vectorization: bool,
    /// Allow pipelines to be executed by multiple workers when all operators
    /// support it.
    pub enable_parallelism: bool,
    /// Number of rows per batch for vectorized pipelines.
    pub batch_size: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            enable_vectorization: true,
            enable_parallelism: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl CompilerConfig {
    /// Parse a config from json, using defaults for missing keys.
    pub fn from_json(s: &str) -> Result<Self> {
        let conf: Self = serde_json::from_str(s).context("Failed to parse compiler config")?;
        conf.validate()?;
        Ok(conf)
    }

    /// Check that the config describes a usable execution mode.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DbError::new("Batch size must be greater than zero")
                .with_field("batch_size", self.batch_size));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize compiler config")
    }
}
