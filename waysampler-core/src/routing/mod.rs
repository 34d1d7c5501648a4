//! Route-covering walks over the road graph and their export.

mod dijkstra;
mod postman;
mod to_geojson;

pub use postman::solve_route_cover;
pub use to_geojson::{total_walk_length, walks_to_geojson};
