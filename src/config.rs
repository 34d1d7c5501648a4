use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use geo::{LineString, Polygon};
use serde::{Deserialize, Serialize};
use waysampler_core::{
    loading::DEFAULT_QUERY_TIMEOUT,
    model::{GeoPoint, LocalTangentPlane, WayKind},
    sampling::GridSettings,
    SamplerConfig,
};

pub const DEFAULT_OVERPASS_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Contents of the TOML configuration file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Directory holding one sub-directory per session
    #[serde(default = "default_session_root")]
    pub session_root: PathBuf,
    pub origin: OriginConfig,
    /// Bounding polygon as `[lon, lat]` pairs
    #[serde(default)]
    pub bounds: Vec<[f64; 2]>,
    #[serde(default)]
    pub overpass: OverpassConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Height of the flat ground used by headless runs, in world units
    #[serde(default)]
    pub ground_height: f64,
}

fn default_session_root() -> PathBuf {
    PathBuf::from("sessions")
}

/// Georeference origin of the world frame
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OriginConfig {
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default = "default_units_per_meter")]
    pub units_per_meter: f64,
}

fn default_units_per_meter() -> f64 {
    100.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OverpassConfig {
    pub endpoint: String,
    pub timeout_secs: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Highway classes to query; all supported classes if empty
    pub way_kinds: Vec<WayKind>,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OVERPASS_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_QUERY_TIMEOUT,
            max_retries: 3,
            retry_delay_ms: 2000,
            way_kinds: Vec::new(),
        }
    }
}

/// Sampling strategy selected for the session
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    #[default]
    WayGraph,
    Replay {
        source: PathBuf,
        #[serde(default)]
        altitude_offset: f64,
    },
    Grid {
        source: PathBuf,
        #[serde(flatten)]
        grid: GridSettings,
    },
}

impl AppConfig {
    /// Reads and checks a configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.sampler.validate()?;
        if let StrategyConfig::Grid { grid, .. } = &config.strategy {
            grid.validate()?;
        }
        if !config.bounds.is_empty() && config.bounds.len() < 3 {
            bail!("bounds need at least three vertices");
        }
        if config.overpass.max_retries == 0 {
            bail!("overpass.max_retries must be at least 1");
        }
        Ok(config)
    }

    pub fn bounds_polygon(&self) -> Option<Polygon<f64>> {
        if self.bounds.is_empty() {
            return None;
        }
        let ring = self
            .bounds
            .iter()
            .map(|&[lon, lat]| (lon, lat))
            .collect::<Vec<_>>();
        Some(Polygon::new(LineString::from(ring), vec![]))
    }

    pub fn georeference(&self) -> LocalTangentPlane {
        LocalTangentPlane::new(
            GeoPoint::new(self.origin.lon, self.origin.lat, self.origin.height),
            self.origin.units_per_meter,
        )
    }
}
