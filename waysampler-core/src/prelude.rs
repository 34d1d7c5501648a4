// Re-export key components
pub use crate::loading::{
    ImageNaming, OverpassResponse, QueryTask, SamplerConfig, build_overpass_query,
    road_graph_from_overpass,
};
pub use crate::model::{
    EdgeKey, GeoPoint, Georeference, LocalTangentPlane, PlanarGeoreference, Pose, RoadGraph,
    Rotation, Walk, WayKind, WorldPos,
};
pub use crate::routing::{solve_route_cover, total_walk_length, walks_to_geojson};
pub use crate::sampling::{
    CaptureBackend, CaptureHandle, CaptureSettings, Candidate, CandidateStep, DedupKey,
    FenceStatus, FlatGround, GridStrategy, Hit, ImageBuffer, InitProgress, MetadataLog,
    PipelineCounters, PipelineState, PipelineStatus, Placement, PlacementSettings,
    PlacementValidator, RayQuery, ReplayStrategy,
    Sample, SampleWalker, SamplingPipeline, SamplingStrategy, SessionLayout, SessionStore,
    SpatialDedupIndex, StreetData, WayGraphStrategy,
};

// Core index types
pub use crate::Error;
pub use crate::NodeId;
pub use crate::WayId;
