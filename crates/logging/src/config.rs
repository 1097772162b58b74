//! crates/logging/src/config.rs
//! Verbosity configuration and `--debug` token parsing.

use super::levels::{DebugFlag, DebugLevels};

/// Complete verbosity configuration for one walker thread.
#[derive(Clone, Default, Debug)]
pub struct VerbosityConfig {
    /// Overall verbosity, from repeated `-v` options.
    pub verbose: u8,
    /// Per-category debug levels.
    pub debug: DebugLevels,
}

impl VerbosityConfig {
    /// Builds a configuration from a repeated-`-v` count, raising every debug
    /// category to that level.
    #[must_use]
    pub fn from_verbose(verbose: u8) -> Self {
        let mut config = Self {
            verbose,
            ..Self::default()
        };
        config.debug.set_all(verbose);
        config
    }

    /// Applies a debug token of the form `<name>` or `<name><level>`,
    /// for example `chdir` or `chdir2`. A bare name selects level 1.
    pub fn apply_debug_flag(&mut self, token: &str) -> Result<(), String> {
        let trimmed = token.trim().to_ascii_lowercase();
        let split = trimmed
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (name, level) = trimmed.split_at(split);
        let level: u8 = if level.is_empty() {
            1
        } else {
            level
                .parse()
                .map_err(|_| format!("invalid debug level in '{token}'"))?
        };
        for flag in DebugFlag::ALL {
            if flag.token() == name {
                self.debug.set(flag, level);
                return Ok(());
            }
        }
        Err(format!("unknown debug flag '{token}'"))
    }
}
