//! Road network data model

pub mod geometry;
pub mod georef;
pub mod graph;
pub mod walk;
pub mod way;

pub use geometry::{Pose, Rotation, WorldPos, clamp_axis};
pub use georef::{GeoPoint, Georeference, LocalTangentPlane, PlanarGeoreference};
pub use graph::{EdgeKey, Node, RoadGraph};
pub use walk::Walk;
pub use way::{Way, WayKind};
