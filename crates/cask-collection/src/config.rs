use std::path::Path;

use cask_types::Locator;
use serde::{Deserialize, Serialize};

use crate::error::{CollectionError, CollectionResult};

/// Default maximum block size: 64 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 26;

/// Settings shared by collection readers and writers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Maximum size of a data block. Writers flush whenever this many bytes
    /// are buffered.
    pub block_size: usize,
    /// Locator written for streams that reference no data.
    pub empty_block_locator: Locator,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            empty_block_locator: Locator::empty_block(),
        }
    }
}

impl CollectionConfig {
    /// Default configuration with a different block size.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size,
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml_str(s: &str) -> CollectionResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| CollectionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> CollectionResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> CollectionResult<()> {
        if self.block_size == 0 {
            return Err(CollectionError::InvalidConfig(
                "block_size must be greater than zero".into(),
            ));
        }
        if self.empty_block_locator.size() != Some(0) {
            return Err(CollectionError::InvalidConfig(format!(
                "empty_block_locator {} must have size 0",
                self.empty_block_locator
            )));
        }
        Ok(())
    }
}
