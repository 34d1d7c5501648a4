use serde::{Deserialize, Serialize};

use crate::Error;
use crate::sampling::{CaptureSettings, PlacementSettings};

/// How captured images are named on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageNaming {
    /// `@E@N@zone@letter@lat@lon@…@.jpg`, derived from the final pose.
    #[default]
    Utm,
    /// `{x}-{y}-{z}-{way}.jpg`, derived from the walker's candidate location
    /// so that resume checks can run before validation.
    Location,
}

/// Sampling session configuration
///
/// Every field has a default, so a partial TOML/JSON document is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Session name, used as the session sub-directory
    pub name: Option<String>,
    /// Arc-length distance between consecutive samples, in world units
    pub sample_distance: f64,
    /// Dedup grid cell size; falls back to `sample_distance`
    pub min_distance_between_samples: Option<f64>,
    pub image_naming: ImageNaming,
    pub placement: PlacementSettings,
    pub capture: CaptureSettings,
    /// Ticks to wait after preparing capture resources
    pub init_wait_ticks: u32,
    /// Ticks to wait between placing the camera and capturing
    pub capture_wait_ticks: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            name: None,
            sample_distance: 800.0,
            min_distance_between_samples: None,
            image_naming: ImageNaming::default(),
            placement: PlacementSettings::default(),
            capture: CaptureSettings::default(),
            init_wait_ticks: 4,
            capture_wait_ticks: 1,
        }
    }
}

impl SamplerConfig {
    pub fn dedup_cell_size(&self) -> f64 {
        self.min_distance_between_samples
            .unwrap_or(self.sample_distance)
    }

    /// Directory name of the session, derived from the sampling parameters
    /// unless a name was given explicitly
    pub fn config_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!(
                "waygraph_sd{:.0}_md{:.0}",
                self.sample_distance,
                self.dedup_cell_size()
            ),
        }
    }

    /// Checks that the numeric parameters are usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] for a non-positive or non-finite sample
    /// distance or dedup cell size.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.sample_distance.is_finite() && self.sample_distance > 0.0) {
            return Err(Error::InvalidData(format!(
                "sample_distance must be positive, got {}",
                self.sample_distance
            )));
        }
        let cell = self.dedup_cell_size();
        if !(cell.is_finite() && cell > 0.0) {
            return Err(Error::InvalidData(format!(
                "min_distance_between_samples must be positive, got {cell}"
            )));
        }
        if let Some(name) = &self.name {
            if name.contains(['/', '\\']) {
                return Err(Error::InvalidData(format!(
                    "session name must not contain path separators: {name}"
                )));
            }
        }
        Ok(())
    }
}
