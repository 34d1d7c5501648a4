use std::path::{Path, PathBuf};
use std::sync::Arc;

use geo::{Contains, Point, Polygon};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use super::{NearestQueue, polygon_json};
use crate::{
    Error,
    model::{GeoPoint, Georeference, Pose, Rotation, WorldPos},
    sampling::{
        Candidate, CandidateStep, InitProgress, Placement, PlacementValidator, SamplingStrategy,
        SessionLayout,
    },
};

/// One row of a CosPlace-style panorama table. Columns not listed here
/// (UTM fields, panorama id, capture date) are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct PanoramaRow {
    pub path: String,
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    pub altitude: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Reads panorama rows from a CSV file with a header line. Malformed rows
/// are skipped.
///
/// # Errors
///
/// Returns an error if the file can't be opened or its header is unreadable.
pub fn read_panorama_rows(path: &Path) -> Result<Vec<PanoramaRow>, Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<PanoramaRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping row {} of {}: {e}", line + 2, path.display()),
        }
    }
    Ok(rows)
}

/// Re-captures recorded panorama locations, nearest remaining location
/// first. The recorded pose is used as is.
pub struct ReplayStrategy {
    source: PathBuf,
    georef: Arc<dyn Georeference>,
    bounds: Option<Polygon<f64>>,
    altitude_offset: f64,
    rows: Vec<PanoramaRow>,
    positions: Vec<WorldPos>,
    queue: NearestQueue,
    last_location: WorldPos,
}

impl ReplayStrategy {
    pub fn new(source: impl Into<PathBuf>, georef: Arc<dyn Georeference>) -> Self {
        Self {
            source: source.into(),
            georef,
            bounds: None,
            altitude_offset: 0.0,
            rows: Vec::new(),
            positions: Vec::new(),
            queue: NearestQueue::default(),
            last_location: WorldPos::ZERO,
        }
    }

    /// Drops rows outside `polygon` (lon/lat)
    pub fn with_bounds(mut self, polygon: Polygon<f64>) -> Self {
        self.bounds = Some(polygon);
        self
    }

    /// Added to the recorded altitude of every row
    pub fn with_altitude_offset(mut self, offset: f64) -> Self {
        self.altitude_offset = offset;
        self
    }

    /// Rows left after filtering, in file order
    pub fn rows(&self) -> &[PanoramaRow] {
        &self.rows
    }

    fn keep_row(&self, row: &PanoramaRow, images_dir: &Path) -> bool {
        if let Some(polygon) = &self.bounds {
            if !polygon.contains(&Point::new(row.lon, row.lat)) {
                return false;
            }
        }
        !images_dir.join(&row.path).exists()
    }

    fn pose(&self, row: &PanoramaRow) -> Pose {
        let location = self.georef.to_world(GeoPoint::new(
            row.lon,
            row.lat,
            row.altitude + self.altitude_offset,
        ));
        Pose::new(
            location,
            Rotation::from_compass(row.heading, row.pitch - 90.0, row.roll),
        )
    }
}

impl SamplingStrategy for ReplayStrategy {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn init(&mut self, layout: &SessionLayout) -> Result<InitProgress, Error> {
        let all_rows = read_panorama_rows(&self.source)?;
        let total = all_rows.len();

        let images_dir = layout.images_dir();
        let rows = all_rows
            .into_iter()
            .filter(|row| self.keep_row(row, &images_dir))
            .collect::<Vec<_>>();
        self.positions = rows.iter().map(|row| self.pose(row).location).collect();
        self.rows = rows;
        self.queue = NearestQueue::new(self.positions.iter().copied().enumerate());
        self.last_location = self.positions.first().copied().unwrap_or(WorldPos::ZERO);

        info!(
            "Replaying {} of {total} panorama locations from {}",
            self.rows.len(),
            self.source.display()
        );
        Ok(InitProgress::Ready)
    }

    fn next_candidate(&mut self) -> Result<CandidateStep, Error> {
        let Some(index) = self.queue.pop_nearest(self.last_location) else {
            return Ok(CandidateStep::Exhausted);
        };
        let row = &self.rows[index];
        let pose = self.pose(row);
        self.last_location = pose.location;

        Ok(CandidateStep::Candidate(Candidate {
            image_name: Some(row.path.clone()),
            ..Candidate::at(pose)
        }))
    }

    fn validate(&self, candidate: &Candidate, validator: &PlacementValidator) -> Option<Placement> {
        Some(Placement {
            pose: candidate.pose,
            artifact_probability: validator.artifact_probability(candidate.pose.location),
        })
    }

    fn describe_config(&self) -> JsonValue {
        json!({
            "BoundingPolygon": polygon_json(self.bounds.as_ref()),
            "SourceFile": self.source.display().to_string(),
        })
    }

    fn estimated_sample_count(&self) -> usize {
        self.rows.len()
    }
}
