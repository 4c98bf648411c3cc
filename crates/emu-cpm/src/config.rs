//! Machine configuration.
//!
//! Every field has a default, so a config file only needs the fields it
//! changes:
//!
//! ```json
//! { "instructions_per_slice": 1280, "decode_policy": "skip" }
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cpm_fdc::{DRIVE_COUNT, DriveGeometry, default_geometries};
use serde::{Deserialize, Serialize};

/// 640 instructions per 10 ms slice is roughly a 2 MHz 8080.
pub const DEFAULT_INSTRUCTIONS_PER_SLICE: u32 = 640;

/// What the driving loop does with an opcode the CPU cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Stop the slice and report the error.
    #[default]
    Halt,
    /// Log it and carry on at the next byte.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpmConfig {
    pub drives: Vec<DriveGeometry>,
    pub instructions_per_slice: u32,
    /// Unanswered console-status polls before a slice yields early.
    /// `None` derives it from the slice length.
    pub poll_limit: Option<u32>,
    pub decode_policy: DecodePolicy,
    /// Directory for the persistent sector store. `None` keeps sectors in
    /// memory for the session only.
    pub store: Option<PathBuf>,
    pub boot_drive: u8,
}

impl Default for CpmConfig {
    fn default() -> Self {
        Self {
            drives: default_geometries(),
            instructions_per_slice: DEFAULT_INSTRUCTIONS_PER_SLICE,
            poll_limit: None,
            decode_policy: DecodePolicy::Halt,
            store: None,
            boot_drive: 0,
        }
    }
}

impl CpmConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Effective poll limit: explicit, or `max(instructions / 200, 3)`.
    #[must_use]
    pub fn poll_limit(&self) -> u32 {
        self.poll_limit
            .unwrap_or_else(|| (self.instructions_per_slice / 200).max(3))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instructions_per_slice == 0 {
            return Err(ConfigError::Invalid(
                "instructions_per_slice must be at least 1".into(),
            ));
        }
        if usize::from(self.boot_drive) >= DRIVE_COUNT {
            return Err(ConfigError::Invalid(format!(
                "boot drive {} does not exist",
                self.boot_drive
            )));
        }
        for drive in &self.drives {
            if usize::from(drive.drive) >= DRIVE_COUNT {
                return Err(ConfigError::Invalid(format!(
                    "drive {} does not exist",
                    drive.drive
                )));
            }
            if drive.tracks == 0 || drive.sectors == 0 {
                return Err(ConfigError::Invalid(format!(
                    "drive {} needs at least one track and one sector",
                    drive.drive
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read config: {e}"),
            Self::Parse(e) => write!(f, "bad config: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Invalid(_) => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}
