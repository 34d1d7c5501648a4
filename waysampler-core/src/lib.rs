//! Road-network sampling core: builds a way graph from map-query data,
//! computes route-covering walks over it and drives a resumable capture
//! pipeline along those walks.

pub mod error;
pub mod loading;
pub mod model;
pub mod prelude;
pub mod routing;
pub mod sampling;

pub use error::Error;
pub use loading::{QueryTask, SamplerConfig, road_graph_from_overpass};
pub use model::{RoadGraph, Walk};
pub use routing::solve_route_cover;
pub use sampling::{PipelineStatus, SamplingPipeline};

/// Dense, 0-based index of a graph node
pub type NodeId = usize;
/// Index into the way table of a [`RoadGraph`]
pub type WayId = usize;
