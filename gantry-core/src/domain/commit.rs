//! Commit domain types

use serde::{Deserialize, Serialize};

/// A source commit that may trigger a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub branch: String,
    pub message: String,
}

impl Commit {
    pub fn new(hash: impl Into<String>, branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            branch: branch.into(),
            message: message.into(),
        }
    }

    /// First eight characters of the hash
    pub fn short_hash(&self) -> &str {
        match self.hash.char_indices().nth(8) {
            Some((end, _)) => &self.hash[..end],
            None => &self.hash,
        }
    }
}
