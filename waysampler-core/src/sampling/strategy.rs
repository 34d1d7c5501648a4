use std::path::PathBuf;

use serde_json::Value as JsonValue;

use super::{Placement, PlacementValidator, SessionLayout};
use crate::{Error, WayId, model::Pose};

/// Candidate camera pose produced by a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub pose: Pose,
    pub way: Option<WayId>,
    pub street_name: String,
    /// File name fixed by the strategy; derived from the final pose if absent
    pub image_name: Option<String>,
    /// Output directory; the session image directory if absent
    pub image_dir: Option<PathBuf>,
}

impl Candidate {
    pub fn at(pose: Pose) -> Self {
        Self {
            pose,
            way: None,
            street_name: String::new(),
            image_name: None,
            image_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same dedup bucket and way as an earlier sample
    Duplicate,
    /// Target image already on disk from an earlier run
    AlreadyCaptured,
}

/// One pull from a strategy
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateStep {
    Candidate(Candidate),
    /// Nothing to sample at this step; pull again
    Skipped(SkipReason),
    /// Every location has been visited
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitProgress {
    Ready,
    /// Waiting on an external task; call `init` again on the next tick
    Pending,
}

/// One way of choosing sample locations. Selected when the session is
/// configured and driven by the pipeline.
pub trait SamplingStrategy: Send {
    fn name(&self) -> &'static str;

    /// Loads or computes the locations to visit. Called once per tick while
    /// it returns [`InitProgress::Pending`]; resets all traversal state when
    /// it completes.
    ///
    /// # Errors
    ///
    /// Fails if no location data can be obtained.
    fn init(&mut self, layout: &SessionLayout) -> Result<InitProgress, Error>;

    /// Produces the next candidate in traversal order
    ///
    /// # Errors
    ///
    /// Fails on corrupt location data.
    fn next_candidate(&mut self) -> Result<CandidateStep, Error>;

    /// Adjusts or rejects a candidate; `None` skips it
    fn validate(&self, candidate: &Candidate, validator: &PlacementValidator) -> Option<Placement> {
        validator.validate(&candidate.pose)
    }

    /// `Info` object written to the head of the sample log
    fn describe_config(&self) -> JsonValue;

    /// Expected number of samples; 0 until initialized
    fn estimated_sample_count(&self) -> usize;
}
