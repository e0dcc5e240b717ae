//! User-mode configuration.
//!
//! Tunables are read from a JSON document; any field left out keeps its
//! default, so an empty object is a valid configuration.

use core_types::{PAGE_SIZE, USER_SPACE_END};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default required alignment of an executable's entry address.
pub const DEFAULT_ENTRY_ALIGNMENT: u64 = 4;

/// Default size of the argument block reserved for the command line.
pub const DEFAULT_MAX_COMMAND_LINE: usize = 1024;

/// Alignment of the argument block at the top of the user stack.
pub const ARGUMENT_BLOCK_ALIGN: u64 = 16;

/// Bytes taken by the argument block for a command line of `len` bytes,
/// NUL terminator and padding included. `None` on overflow.
pub fn argument_block_size(len: usize) -> Option<u64> {
    (len as u64)
        .checked_add(ARGUMENT_BLOCK_ALIGN)
        .map(|size| size & !(ARGUMENT_BLOCK_ALIGN - 1))
}

/// Errors related to loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for process creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserModeConfig {
    /// Required alignment of the entry address (power of two).
    pub entry_alignment: u64,
    /// Bytes of kernel stack per thread (page multiple).
    pub kernel_stack_size: u64,
    /// Bytes of user stack per process (page multiple).
    pub user_stack_size: u64,
    /// Longest command line the argument block can hold.
    pub max_command_line: usize,
}

impl Default for UserModeConfig {
    fn default() -> Self {
        Self {
            entry_alignment: DEFAULT_ENTRY_ALIGNMENT,
            kernel_stack_size: PAGE_SIZE,
            user_stack_size: PAGE_SIZE,
            max_command_line: DEFAULT_MAX_COMMAND_LINE,
        }
    }
}

impl UserModeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.entry_alignment.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "entry_alignment must be a power of two, got {}",
                self.entry_alignment
            )));
        }

        for (name, size) in [
            ("kernel_stack_size", self.kernel_stack_size),
            ("user_stack_size", self.user_stack_size),
        ] {
            if size == 0 || size % PAGE_SIZE != 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-zero multiple of {} bytes, got {}",
                    name, PAGE_SIZE, size
                )));
            }
        }

        if self.user_stack_size >= USER_SPACE_END {
            return Err(ConfigError::Invalid(format!(
                "user_stack_size must be below {:#x}, got {:#x}",
                USER_SPACE_END, self.user_stack_size
            )));
        }

        if self.max_command_line == 0 {
            return Err(ConfigError::Invalid(
                "max_command_line cannot be zero".to_string(),
            ));
        }

        // The argument block sits at the top of the user stack and must
        // leave room below it.
        match argument_block_size(self.max_command_line) {
            Some(block) if block < self.user_stack_size => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "max_command_line {} does not fit in a {}-byte user stack",
                    self.max_command_line, self.user_stack_size
                )))
            }
        }

        Ok(())
    }

    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: UserModeConfig =
            serde_json::from_str(data).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data =
            fs::read_to_string(path.as_ref()).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::from_json_str(&data)
    }
}
