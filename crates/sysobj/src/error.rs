//! Engine error types.
//!
//! Missing, unreadable or binary objects are node *state*, not errors. The
//! variants here cover programmer contract violations caught at registration
//! time and configuration loading.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// sysobj error type.
#[derive(Debug, Error)]
pub enum SysobjError {
    /// A class asked to be both a directory and not a directory.
    #[error("class {0}: cannot require both directory and non-directory")]
    ContradictoryClass(String),

    /// A class declared no pattern to match against.
    #[error("class {0}: empty match pattern")]
    EmptyPattern(String),

    /// A filter rule string did not parse.
    #[error("invalid filter rule: {0}")]
    InvalidFilter(String),

    /// The alternate root does not exist or is not a directory.
    #[error("invalid alternate root: {}", .0.display())]
    InvalidRoot(PathBuf),

    /// Config file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file did not parse.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl SysobjError {
    /// Create a ContradictoryClass error.
    pub fn contradictory_class(tag: impl Into<String>) -> Self {
        Self::ContradictoryClass(tag.into())
    }

    /// Create an InvalidFilter error.
    pub fn invalid_filter(rule: impl Into<String>) -> Self {
        Self::InvalidFilter(rule.into())
    }
}

/// sysobj result type.
pub type Result<T> = std::result::Result<T, SysobjError>;
