// SPDX-License-Identifier: MPL-2.0

//! Reconstruction settings, readable from TOML.
//!
//! ```toml
//! size = 1024
//! flip_vertical = true
//!
//! [region]
//! x = 940
//! y = 492
//! width = 70
//! ```
//!
//! Missing keys take their default value.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::phase::DEFAULT_DISPLAY_SCALE;
use crate::sideband::Region;

/// Settings of the reconstruction pipeline and of the distributed benchmark loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconstructionConfig {
    /// Side length N of the holograms.
    pub size: usize,
    /// Initial sideband region.
    pub region: Region,
    /// Factor applied to spectrum magnitudes for display.
    pub display_scale: f64,
    /// Output the phase map upside down.
    pub flip_vertical: bool,
    /// Number of frames run by the distributed loop.
    pub frames: u64,
    /// Number of workers of the distributed loop.
    pub workers: usize,
    /// Give up on a collective after this many milliseconds, wait forever if unset.
    pub collective_timeout_ms: Option<u64>,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            region: Region::new(940, 492, 70),
            display_scale: DEFAULT_DISPLAY_SCALE,
            flip_vertical: true,
            frames: 300,
            workers: 4,
            collective_timeout_ms: None,
        }
    }
}

impl ReconstructionConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|err| Error::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::config(format!("{}: {}", path.display(), err)))?;
        Self::from_toml_str(&text)
    }

    /// Check values that deserialization alone cannot rule out.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::config("size must be positive"));
        }
        if self.workers == 0 || self.workers > self.size {
            return Err(Error::config(format!(
                "workers must be between 1 and {}, got {}",
                self.size, self.workers
            )));
        }
        if !self.display_scale.is_finite() || self.display_scale <= 0.0 {
            return Err(Error::config("display_scale must be a positive number"));
        }
        Ok(())
    }

    /// Timeout of the collectives, if any.
    pub fn collective_timeout(&self) -> Option<Duration> {
        self.collective_timeout_ms.map(Duration::from_millis)
    }
}
