use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use super::NearestQueue;
use crate::{
    Error,
    model::{GeoPoint, Georeference, Pose, Rotation, WorldPos},
    sampling::{
        Candidate, CandidateStep, InitProgress, Placement, PlacementValidator, SamplingStrategy,
        SessionLayout, naming::parse_image_name,
    },
};

/// Layout of the grid sampled around each prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    /// Cells per horizontal half-axis; the grid is `2r x 2r x 1`
    pub radius: u32,
    /// Cell extent along x, y and z
    pub cell_size: [f64; 3],
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            radius: 1,
            cell_size: [800.0, 800.0, 200.0],
        }
    }
}

impl GridSettings {
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] for a zero radius or a cell size that
    /// is not positive.
    pub fn validate(&self) -> Result<(), Error> {
        if self.radius == 0 {
            return Err(Error::InvalidData("grid radius must be at least 1".to_string()));
        }
        if let Some(size) = self.cell_size.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(Error::InvalidData(format!(
                "grid cell sizes must be positive, got {size}"
            )));
        }
        Ok(())
    }

    fn dimensions(&self) -> [usize; 3] {
        let side = 2 * self.radius as usize;
        [side, side, 1]
    }

    pub fn cell_count(&self) -> usize {
        self.dimensions().iter().product()
    }

    /// Offset of the centre of cell `index` from the grid centre. Cells are
    /// numbered x fastest, then y, then z.
    pub fn cell_offset(&self, index: usize) -> WorldPos {
        let dims = self.dimensions();
        let [dx, dy, _] = dims;
        let coords = [index % dx, (index / dx) % dy, index / (dx * dy)];
        let axis = |i: usize| (coords[i] as f64 - dims[i] as f64 / 2.0 + 0.5) * self.cell_size[i];
        WorldPos::new(axis(0), axis(1), axis(2))
    }
}

#[derive(Debug, Deserialize)]
struct PredictionBatch {
    predictions: Vec<String>,
    database_outdir: PathBuf,
}

/// Predicted capture location, read back from its image name
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub pose: Pose,
    /// Image name without extension; grid images are named after it
    pub base_name: String,
    pub image_dir: PathBuf,
}

/// Reads the predictions file and recovers each prediction's pose. Names
/// that don't follow the image naming convention are skipped.
///
/// # Errors
///
/// Returns an error if the file can't be read or isn't a list of
/// prediction batches.
pub fn read_predictions(path: &Path, georef: &dyn Georeference) -> Result<Vec<Prediction>, Error> {
    let file = File::open(path)?;
    let batches: Vec<PredictionBatch> = serde_json::from_reader(BufReader::new(file))?;

    let mut predictions = Vec::new();
    for batch in batches {
        for name in batch.predictions {
            let parsed = match parse_image_name(&name) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Skipping prediction: {e}");
                    continue;
                }
            };
            let base_name = Path::new(&name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&name)
                .to_string();
            let location = georef.to_world(GeoPoint::new(parsed.lon, parsed.lat, parsed.altitude));
            predictions.push(Prediction {
                pose: Pose::new(
                    location,
                    Rotation::from_compass(parsed.heading, parsed.pitch - 90.0, parsed.roll),
                ),
                base_name,
                image_dir: batch.database_outdir.clone(),
            });
        }
    }
    Ok(predictions)
}

/// Samples a grid of cells around each predicted location, re-aimed at the
/// prediction's focal point. Predictions are visited nearest first.
pub struct GridStrategy {
    source: PathBuf,
    georef: Arc<dyn Georeference>,
    settings: GridSettings,
    predictions: Vec<Prediction>,
    queue: NearestQueue,
    current: Option<usize>,
    next_cell: usize,
    last_location: WorldPos,
}

impl GridStrategy {
    pub fn new(source: impl Into<PathBuf>, georef: Arc<dyn Georeference>) -> Self {
        Self {
            source: source.into(),
            georef,
            settings: GridSettings::default(),
            predictions: Vec::new(),
            queue: NearestQueue::default(),
            current: None,
            next_cell: 0,
            last_location: WorldPos::ZERO,
        }
    }

    pub fn with_settings(mut self, settings: GridSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    fn current_prediction(&self) -> Option<&Prediction> {
        self.current.and_then(|index| self.predictions.get(index))
    }
}

impl SamplingStrategy for GridStrategy {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn init(&mut self, _layout: &SessionLayout) -> Result<InitProgress, Error> {
        self.settings.validate()?;
        self.predictions = read_predictions(&self.source, self.georef.as_ref())?;
        self.queue = NearestQueue::new(
            self.predictions
                .iter()
                .enumerate()
                .map(|(index, p)| (index, p.pose.location)),
        );
        self.current = None;
        self.next_cell = 0;
        self.last_location = self
            .predictions
            .first()
            .map_or(WorldPos::ZERO, |p| p.pose.location);

        info!(
            "Sampling {} cells around each of {} predictions from {}",
            self.settings.cell_count(),
            self.predictions.len(),
            self.source.display()
        );
        Ok(InitProgress::Ready)
    }

    fn next_candidate(&mut self) -> Result<CandidateStep, Error> {
        if self.current.is_none() || self.next_cell >= self.settings.cell_count() {
            let Some(index) = self.queue.pop_nearest(self.last_location) else {
                self.current = None;
                return Ok(CandidateStep::Exhausted);
            };
            self.current = Some(index);
            self.next_cell = 0;
            self.last_location = self.predictions[index].pose.location;
        }
        let Some(prediction) = self.current_prediction() else {
            return Err(Error::UnrecoverableError("grid prediction index out of range"));
        };

        let cell = self.next_cell;
        let candidate = Candidate {
            image_name: Some(format!("{}_{cell}.jpg", prediction.base_name)),
            image_dir: Some(prediction.image_dir.clone()),
            ..Candidate::at(Pose::new(
                prediction.pose.location + self.settings.cell_offset(cell),
                prediction.pose.rotation,
            ))
        };
        self.next_cell += 1;
        Ok(CandidateStep::Candidate(candidate))
    }

    fn validate(&self, candidate: &Candidate, validator: &PlacementValidator) -> Option<Placement> {
        let reference = self.current_prediction()?.pose;
        let placement = validator.validate_ground_only(&candidate.pose)?;
        Some(validator.look_at_focus(&reference, placement))
    }

    fn describe_config(&self) -> JsonValue {
        json!({
            "SourceFile": self.source.display().to_string(),
            "GridRadius": self.settings.radius,
            "CellSize": self.settings.cell_size,
        })
    }

    fn estimated_sample_count(&self) -> usize {
        self.predictions.len() * self.settings.cell_count()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        model::PlanarGeoreference,
        sampling::{FlatGround, PlacementSettings},
    };

    fn prediction_name(lat: f64, lon: f64, heading: f64) -> String {
        format!("/db/@0@0@31@N@{lat}@{lon}@@@{heading}@90@0@0@@art_prob_0@.jpg")
    }

    fn write_predictions(dir: &Path, names: &[String]) -> PathBuf {
        let path = dir.join("predictions.json");
        let content = json!([{
            "predictions": names,
            "database_outdir": dir.join("out"),
        }]);
        fs::write(&path, content.to_string()).unwrap();
        path
    }

    #[test]
    fn test_cell_offsets_surround_centre() {
        let settings = GridSettings::default();
        assert_eq!(settings.cell_count(), 4);
        assert_eq!(settings.cell_offset(0), WorldPos::new(-400.0, -400.0, 0.0));
        assert_eq!(settings.cell_offset(1), WorldPos::new(400.0, -400.0, 0.0));
        assert_eq!(settings.cell_offset(2), WorldPos::new(-400.0, 400.0, 0.0));
        assert_eq!(settings.cell_offset(3), WorldPos::new(400.0, 400.0, 0.0));

        let wide = GridSettings {
            radius: 2,
            ..GridSettings::default()
        };
        assert_eq!(wide.cell_count(), 16);
        assert_eq!(wide.cell_offset(0), WorldPos::new(-1200.0, -1200.0, 0.0));
    }

    #[test]
    fn test_degenerate_grid_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_predictions(dir.path(), &[prediction_name(0.0, 0.0, 0.0)]);
        let layout = SessionLayout::new(dir.path(), "session");

        let empty = GridSettings {
            radius: 0,
            ..GridSettings::default()
        };
        let mut strategy = GridStrategy::new(&source, Arc::new(PlanarGeoreference::default()))
            .with_settings(empty);
        assert!(matches!(strategy.init(&layout), Err(Error::InvalidData(_))));

        let flat = GridSettings {
            cell_size: [800.0, 0.0, 200.0],
            ..GridSettings::default()
        };
        assert!(flat.validate().is_err());
        assert!(GridSettings::default().validate().is_ok());
    }

    #[test]
    fn test_grid_around_each_prediction_nearest_first() {
        let dir = tempfile::tempdir().unwrap();
        let names = vec![
            prediction_name(0.0, 0.0, 0.0),
            prediction_name(0.0, 10_000.0, 0.0),
            "not-a-prediction.jpg".to_string(),
            prediction_name(0.0, 2000.0, 0.0),
        ];
        let source = write_predictions(dir.path(), &names);
        let layout = SessionLayout::new(dir.path(), "session");
        let mut strategy = GridStrategy::new(&source, Arc::new(PlanarGeoreference::default()));

        strategy.init(&layout).unwrap();
        assert_eq!(strategy.predictions().len(), 3);
        assert_eq!(strategy.estimated_sample_count(), 12);

        let mut candidates = Vec::new();
        while let CandidateStep::Candidate(c) = strategy.next_candidate().unwrap() {
            candidates.push(c);
        }
        assert_eq!(candidates.len(), 12);

        let first = &candidates[0];
        assert_eq!(first.pose.location, WorldPos::new(-400.0, -400.0, 0.0));
        assert_eq!(first.image_dir.as_deref(), Some(dir.path().join("out").as_path()));
        assert!(first.image_name.as_deref().unwrap().ends_with("art_prob_0@_0.jpg"));

        // The prediction at x=2000 is closer than the one at x=10000
        assert_eq!(candidates[4].pose.location.x, 1600.0);
        assert_eq!(candidates[8].pose.location.x, 9600.0);
    }

    #[test]
    fn test_validation_reaims_at_focal_point() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_predictions(dir.path(), &[prediction_name(0.0, 0.0, 90.0)]);
        let layout = SessionLayout::new(dir.path(), "session");
        let mut strategy = GridStrategy::new(&source, Arc::new(PlanarGeoreference::default()));
        strategy.init(&layout).unwrap();

        let CandidateStep::Candidate(candidate) = strategy.next_candidate().unwrap() else {
            panic!("expected a candidate");
        };
        let validator =
            PlacementValidator::new(Arc::new(FlatGround::new(0.0)), PlacementSettings::default());
        let placement = strategy.validate(&candidate, &validator).unwrap();

        // Ground clearance plus the focus camera height
        assert_eq!(placement.pose.location, WorldPos::new(-400.0, -400.0, 450.0));
        // Level forward probe misses the ground; fallback focus 2500 east of
        // the prediction. Looking from (-400, -400) the target is north-east.
        let yaw = placement.pose.rotation.yaw;
        assert!(yaw > 0.0 && yaw < 90.0, "yaw {yaw}");
    }
}
