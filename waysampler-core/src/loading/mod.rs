//! This module is responsible for loading road-network data from Overpass
//! query results and building the road graph used for sampling.

mod builder;
mod config;
pub mod overpass;
mod query;
mod task;

pub use builder::{road_graph_from_overpass, road_graph_from_overpass_file};
pub use config::{ImageNaming, SamplerConfig};
pub use overpass::{OverpassElement, OverpassResponse};
pub use query::{DEFAULT_QUERY_TIMEOUT, build_overpass_query};
pub use task::{QueryResult, QueryTask};
