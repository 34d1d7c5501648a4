use serde::{Deserialize, Serialize};

/// One metadata record of the sample log. Field names follow the dataset
/// consumers (`ImagePath`, `HeadingAngle`, `Lon`, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sample {
    /// Image path relative to the session directory, absent if no image
    /// was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    /// Compass heading in degrees, clockwise from north
    pub heading_angle: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub roll: f64,
    pub lon: f64,
    pub lat: f64,
    pub altitude: f64,
    #[serde(default)]
    pub street_name: String,
    #[serde(default)]
    pub artifact_probability: f64,
}
