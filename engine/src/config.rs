//! Engine configuration.
//!
//! `CopyConfig` holds the tunables shared by every job an orchestrator starts:
//! the block size each worker transfers per iteration, and the naming
//! convention for segment files.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bytes transferred per read/write iteration.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Segment files are named `{prefix}{index}.{extension}`.
pub const DEFAULT_SEGMENT_PREFIX: &str = "Part_";
pub const DEFAULT_SEGMENT_EXTENSION: &str = "dat";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Size of each block a worker reads and writes
    pub block_size: usize,

    /// File name prefix for segment files
    pub segment_prefix: String,

    /// File extension for segment files (without the dot; may be empty)
    pub segment_extension: String,
}

impl Default for CopyConfig {
    fn default() -> Self {
        CopyConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            segment_prefix: DEFAULT_SEGMENT_PREFIX.to_string(),
            segment_extension: DEFAULT_SEGMENT_EXTENSION.to_string(),
        }
    }
}

impl CopyConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_segment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.segment_prefix = prefix.into();
        self
    }

    /// Check the configuration before it is used to start a job.
    ///
    /// # Errors
    /// `InvalidBlockSize` for a zero block size, `InvalidConfig` for a prefix
    /// that is empty or would escape the destination directory.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.block_size == 0 {
            return Err(EngineError::InvalidBlockSize {
                size: self.block_size,
            });
        }
        if self.segment_prefix.is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "segment prefix is empty".to_string(),
            });
        }
        let has_separator = |s: &str| s.contains('/') || s.contains('\\');
        if has_separator(&self.segment_prefix) || has_separator(&self.segment_extension) {
            return Err(EngineError::InvalidConfig {
                reason: "segment name must not contain path separators".to_string(),
            });
        }
        Ok(())
    }

    /// File name of the segment written by worker `index`.
    pub fn segment_file_name(&self, index: usize) -> String {
        if self.segment_extension.is_empty() {
            format!("{}{}", self.segment_prefix, index)
        } else {
            format!("{}{}.{}", self.segment_prefix, index, self.segment_extension)
        }
    }

    /// Full path of the segment written by worker `index` inside `directory`.
    pub fn segment_path(&self, directory: &Path, index: usize) -> PathBuf {
        directory.join(self.segment_file_name(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_segment_names() {
        let config = CopyConfig::default();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.segment_file_name(0), "Part_0.dat");
        assert_eq!(config.segment_file_name(12), "Part_12.dat");
    }

    #[test]
    fn test_segment_name_without_extension() {
        let mut config = CopyConfig::default().with_segment_prefix("chunk-");
        config.segment_extension = String::new();
        assert_eq!(config.segment_file_name(3), "chunk-3");
    }

    #[test]
    fn test_validate_rejects_zero_block_size() {
        let config = CopyConfig::default().with_block_size(0);
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidBlockSize { size: 0 })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_prefix() {
        assert!(CopyConfig::default().with_segment_prefix("").validate().is_err());
        assert!(CopyConfig::default()
            .with_segment_prefix("../escape")
            .validate()
            .is_err());
        assert!(CopyConfig::default().validate().is_ok());
    }
}
