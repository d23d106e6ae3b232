use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{StagelockError, StagelockResult};

/// Top-level configuration (loaded from stagelock.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagelockConfig {
    pub puzzle: PuzzleConfig,
    pub unlock: UnlockConfig,
    pub session: SessionConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PuzzleConfig {
    /// Root stage document (default: puzzles.json)
    pub path: PathBuf,
}

/// Unlock tuning. The scrypt parameters themselves are fixed and not
/// configurable: existing ciphertexts were produced with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockConfig {
    /// Interval between progress estimates while a key is derived (default: 100)
    pub progress_tick_ms: u64,
    /// Expected duration of one derivation before any has been measured (default: 750)
    pub derive_estimate_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prompt written before each response is read
    pub prompt: String,
    /// Re-prompt on an empty response without attempting an unlock
    pub skip_empty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for PuzzleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("puzzles.json"),
        }
    }
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            progress_tick_ms: 100,
            derive_estimate_ms: 750,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prompt: "\u{203a} ".into(),
            skip_empty: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl StagelockConfig {
    /// Parse a TOML document; missing sections and keys take their defaults.
    pub fn from_toml_str(s: &str) -> StagelockResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| StagelockError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file at `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> StagelockResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> StagelockResult<()> {
        if self.unlock.progress_tick_ms == 0 {
            return Err(StagelockError::Config(
                "unlock.progress_tick_ms must be at least 1".into(),
            ));
        }
        if !matches!(self.log.format.as_str(), "json" | "text") {
            return Err(StagelockError::Config(format!(
                "log.format must be \"json\" or \"text\", got {:?}",
                self.log.format
            )));
        }
        Ok(())
    }
}
