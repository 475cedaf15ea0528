//! Construction-time parameters for the index engines.
//!
//! The original source hard-codes `R`, `M` and `KEY_LEN` as process-wide
//! constants. Here they live on an `EngineParams` value stored inside each
//! engine instance: still fixed for the lifetime of a given file, but no
//! longer a global that every engine in the process must share.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{EngineError, Result};

/// Fanout / page-capacity parameters shared by the B+Tree and the record
/// codec's key-length limit. Extendible Hashing and Sequential File only
/// consume `m`/`key_len` respectively; each engine documents which fields
/// it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Index fanout: max children per internal B+Tree node.
    pub r: usize,
    /// Page/bucket capacity: max records per B+Tree data page or hash bucket.
    pub m: usize,
    /// Max encoded length, in bytes, of a key string.
    pub key_len: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        EngineParams {
            r: 40,
            m: 20,
            key_len: 30,
        }
    }
}

impl EngineParams {
    pub fn validate(&self) -> Result<()> {
        if self.r < 3 {
            return Err(EngineError::InvalidInput(format!(
                "r must be at least 3 to form a meaningful internal node, got {}",
                self.r
            )));
        }
        if self.m < 1 {
            return Err(EngineError::InvalidInput(format!(
                "m must be at least 1, got {}",
                self.m
            )));
        }
        if self.key_len == 0 {
            return Err(EngineError::InvalidInput(
                "key_len must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let params: EngineParams =
            toml::from_str(&text).map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn save_toml(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| EngineError::Invariant(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// File paths backing a B+Tree instance: an index file of fixed-size
/// internal/leaf nodes and a data file of fixed-size leaf pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BTreePaths {
    pub index_file: String,
    pub data_file: String,
}

/// File paths backing an Extendible Hashing instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashingPaths {
    pub directory_file: String,
    pub data_file: String,
}

/// File paths backing a Sequential File instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeqFilePaths {
    pub main_file: String,
    pub aux_file: String,
}
