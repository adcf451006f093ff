//! Player options.
//!
//! Options load from TOML; every key is optional:
//!
//! ```toml
//! fps = 60
//! turbo = false
//! username = "ada"
//! seed = 42
//! max_clones = 300
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How the engine runs a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerOptions {
    /// Frames per second; sets the per-frame time budget.
    pub fps: u32,
    /// Run a single drain per frame; threads started mid-frame wait for
    /// the next one.
    pub turbo: bool,
    /// Reported by `sensing_username`.
    pub username: String,
    /// Seed for `pick random`; entropy when absent.
    pub seed: Option<u64>,
    /// Live clones allowed at once.
    pub max_clones: usize,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self { fps: 30, turbo: false, username: String::new(), seed: None, max_clones: 300 }
    }
}

impl PlayerOptions {
    /// Parses TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let options: Self = toml::from_str(text)?;
        options.validate()
    }

    /// Reads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Rejects values the scheduler cannot run with.
    pub fn validate(self) -> Result<Self> {
        if self.fps == 0 {
            return Err(Error::Config("fps must be at least 1".into()));
        }
        Ok(self)
    }

    /// Length of one frame, in seconds.
    pub fn frame_seconds(&self) -> f64 {
        1.0 / f64::from(self.fps.max(1))
    }

    /// Soft time budget for one `step`.
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs_f64(self.frame_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PlayerOptions::from_toml("").unwrap();
        assert_eq!(options, PlayerOptions::default());
        assert_eq!(options.frame_budget(), Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn test_partial_file() {
        let options = PlayerOptions::from_toml("fps = 60\nusername = \"ada\"\nseed = 7").unwrap();
        assert_eq!(options.fps, 60);
        assert_eq!(options.username, "ada");
        assert_eq!(options.seed, Some(7));
        assert!(!options.turbo);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(PlayerOptions::from_toml("fps = 0"), Err(Error::Config(_))));
        assert!(matches!(PlayerOptions::from_toml("frames = 3"), Err(Error::Config(_))));
    }
}
