//! Sampling along the road network: candidate generation, placement
//! checks, capture coordination and the persisted session state.

mod capture;
mod dedup;
mod jobs;
pub mod metadata;
pub mod naming;
mod pipeline;
mod ray;
mod sample;
mod session;
mod strategies;
mod strategy;
mod validator;
mod walker;

pub use capture::{
    CaptureBackend, CaptureHandle, CaptureSettings, FenceStatus, ImageBuffer, write_image,
};
pub use dedup::{DedupKey, SpatialDedupIndex};
pub use jobs::BackgroundJob;
pub use metadata::{MetadataDocument, MetadataLog, RepairReport, read_log, repair};
pub use pipeline::{PipelineCounters, PipelineState, PipelineStatus, SamplingPipeline};
pub use ray::{FlatGround, Hit, RayQuery};
pub use sample::Sample;
pub use session::{
    IMAGES_DIR, SAMPLES_FILE, STREET_DATA_FILE, SessionLayout, SessionStore, StreetData,
};
pub use strategies::{
    GridSettings, GridStrategy, PanoramaRow, Prediction, ReplayStrategy, WayGraphStrategy,
    read_panorama_rows, read_predictions,
};
pub use strategy::{Candidate, CandidateStep, InitProgress, SamplingStrategy, SkipReason};
pub use validator::{FocusSettings, Placement, PlacementSettings, PlacementValidator};
pub use walker::{SampleCursor, SampleWalker};
