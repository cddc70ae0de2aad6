//! Engine configuration.
//!
//! Everything has a default, so an empty file (or no file) is a valid
//! configuration. Loaded from `$XDG_CONFIG_HOME/sysobj/config.toml` by
//! default:
//!
//! ```toml
//! alt_root = "/srv/snapshots/host1"
//! default_update_interval_secs = 5.0
//!
//! [crawl]
//! threads = 4
//! roots = [":/", "/sys/class"]
//! filters = ["-/proc/*", "+/proc/cpuinfo"]
//!
//! [pins]
//! history_len = 300
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SysobjError};
use crate::filter::FilterRule;
use crate::path::VIRTUAL_ROOT;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Resolve real paths below this directory instead of `/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_root: Option<PathBuf>,

    /// Re-read interval for nodes whose class has no opinion.
    pub default_update_interval_secs: f64,

    /// Upper bound on bytes read from a single real node.
    pub max_read_bytes: usize,

    /// Register the built-in `:/sysobj` objects and classes.
    pub builtins: bool,

    pub crawl: CrawlConfig,
    pub pins: PinConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alt_root: None,
            default_update_interval_secs: 10.0,
            max_read_bytes: 64 * 1024,
            builtins: true,
            crawl: CrawlConfig::default(),
            pins: PinConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SysobjError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Self::from_toml_str(&text)
    }

    /// `<config dir>/sysobj/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sysobj").join("config.toml"))
    }

    /// Load the default file if it exists, else use defaults.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Set the alternate root.
    pub fn with_alt_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.alt_root = Some(root.into());
        self
    }

    /// Enable or disable built-in objects.
    pub fn with_builtins(mut self, builtins: bool) -> Self {
        self.builtins = builtins;
        self
    }

    /// The default update interval as a duration.
    pub fn default_update_interval(&self) -> Duration {
        Duration::from_secs_f64(self.default_update_interval_secs.max(0.0))
    }
}

/// Crawler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Worker count; defaults to the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    /// How long an idle worker sleeps before looking again.
    pub wait_step_ms: u64,

    /// Idle workers retire once their combined waiting exceeds this.
    pub wait_ceiling_ms: u64,

    /// Where a crawl starts.
    pub roots: Vec<String>,

    /// Filter chain applied to every visited path.
    pub filters: Vec<FilterRule>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            threads: None,
            wait_step_ms: 5,
            wait_ceiling_ms: 2000,
            roots: vec![VIRTUAL_ROOT.to_string()],
            filters: Vec::new(),
        }
    }
}

/// Pin settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Samples kept per pin.
    pub history_len: usize,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self { history_len: 120 }
    }
}
