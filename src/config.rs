//! Configuration types for par2guard
//!
//! Settings are read once at start-up and threaded explicitly through the
//! resolver and orchestrator. The engine never writes them back.

use crate::error::{Error, Result};
use crate::types::Redundancy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which option controls the amount of recovery data on create
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// Percentage of the protected data (`-r`)
    #[default]
    Redundancy,
    /// Fixed number of recovery blocks (`-c`)
    RecoveryBlocks,
}

/// Defaults for create runs
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateConfig {
    /// Redundancy percentage, 1-100 (default: 10)
    #[serde(default = "default_redundancy_percent")]
    pub redundancy_percent: u8,

    /// Whether `redundancy_percent` or `recovery_blocks` is used
    #[serde(default)]
    pub create_mode: CreateMode,

    /// Recovery block count for [`CreateMode::RecoveryBlocks`] (default: 100)
    #[serde(default = "default_recovery_blocks")]
    pub recovery_blocks: u32,

    /// Block size in KiB, 0 lets par2 choose (default: 0)
    #[serde(default)]
    pub block_size_kb: u32,

    /// Include files in subfolders when a folder is selected (default: false)
    #[serde(default)]
    pub recursive: bool,
}

impl Default for CreateConfig {
    fn default() -> Self {
        Self {
            redundancy_percent: default_redundancy_percent(),
            create_mode: CreateMode::default(),
            recovery_blocks: default_recovery_blocks(),
            block_size_kb: 0,
            recursive: false,
        }
    }
}

impl CreateConfig {
    /// Redundancy setting implied by the configured create mode
    pub fn redundancy(&self) -> Redundancy {
        match self.create_mode {
            CreateMode::Redundancy => Redundancy::Percent(self.redundancy_percent),
            CreateMode::RecoveryBlocks => Redundancy::RecoveryBlocks(self.recovery_blocks),
        }
    }

    /// Configured block size in bytes, `None` for automatic
    pub fn block_size_bytes(&self) -> Option<u32> {
        match self.block_size_kb {
            0 => None,
            kb => Some(kb.saturating_mul(1024)),
        }
    }
}

/// External tool location
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to par2 executable (auto-detected if None)
    #[serde(default)]
    pub par2_path: Option<PathBuf>,

    /// Whether to search PATH for par2 if `par2_path` is not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            par2_path: None,
            search_path: true,
        }
    }
}

impl ToolsConfig {
    /// Locate the par2 binary
    ///
    /// An explicit `par2_path` wins; otherwise PATH is searched when allowed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProcessLaunch`] when no usable binary is found.
    pub fn locate_par2(&self) -> Result<PathBuf> {
        if let Some(path) = &self.par2_path {
            return which::which(path).map_err(|e| Error::ProcessLaunch {
                program: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
            });
        }

        if !self.search_path {
            return Err(Error::ProcessLaunch {
                program: PathBuf::from(PAR2_BIN),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "par2_path is not set and PATH search is disabled",
                ),
            });
        }

        which::which(PAR2_BIN).map_err(|e| Error::ProcessLaunch {
            program: PathBuf::from(PAR2_BIN),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("'{}' not found in PATH ({})", PAR2_BIN, e),
            ),
        })
    }
}

/// Multi-disc folder detection settings
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscConfig {
    /// Words that introduce a disc number in a folder name (default: disc, disk, cd, dvd)
    #[serde(default = "default_disc_keywords")]
    pub disc_keywords: Vec<String>,

    /// Treat a bare trailing number as a disc number when siblings share the prefix (default: true)
    #[serde(default = "default_true")]
    pub bare_disc_numbers: bool,
}

impl Default for DiscConfig {
    fn default() -> Self {
        Self {
            disc_keywords: default_disc_keywords(),
            bare_disc_numbers: true,
        }
    }
}

/// Main configuration for par2guard
///
/// Sub-configs are flattened, so the TOML file is a single flat table:
///
/// ```toml
/// default_path = "/home/me/Music"
/// redundancy_percent = 15
/// verbose_logging = true
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Folder offered first when selecting inputs (default: home directory)
    #[serde(default = "default_path")]
    pub default_path: PathBuf,

    /// Forward every tool output line instead of key lines only (default: false)
    #[serde(default)]
    pub verbose_logging: bool,

    /// Capacity of the progress event channel (default: 1024)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Create defaults
    #[serde(flatten)]
    pub create: CreateConfig,

    /// External tool location
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Multi-disc folder detection
    #[serde(flatten)]
    pub disc: DiscConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_path: default_path(),
            verbose_logging: false,
            event_buffer: default_event_buffer(),
            create: CreateConfig::default(),
            tools: ToolsConfig::default(),
            disc: DiscConfig::default(),
        }
    }
}

impl Config {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(?path, "loaded configuration");
        Ok(config)
    }

    /// Load configuration from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(?path, "configuration file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.create.redundancy_percent) {
            return Err(Error::config(
                "redundancy_percent",
                format!(
                    "must be between 1 and 100, got {}",
                    self.create.redundancy_percent
                ),
            ));
        }
        if self.create.recovery_blocks == 0 {
            return Err(Error::config("recovery_blocks", "must be at least 1"));
        }
        if self.event_buffer == 0 {
            return Err(Error::config("event_buffer", "must be at least 1"));
        }
        if self
            .disc
            .disc_keywords
            .iter()
            .any(|k| k.trim().is_empty())
        {
            return Err(Error::config("disc_keywords", "keywords must not be empty"));
        }
        Ok(())
    }
}

/// Name of the par2cmdline executable searched for in PATH
pub const PAR2_BIN: &str = "par2";

fn default_path() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_redundancy_percent() -> u8 {
    10
}

fn default_recovery_blocks() -> u32 {
    100
}

fn default_event_buffer() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_disc_keywords() -> Vec<String> {
    ["disc", "disk", "cd", "dvd"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
