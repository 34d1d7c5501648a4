//! Sampling strategies: route-covering walks over a road graph, replay of
//! recorded panorama locations, and grids around predicted locations.

mod grid;
mod replay;
mod way_graph;

pub use grid::{GridSettings, GridStrategy, Prediction, read_predictions};
pub use replay::{PanoramaRow, ReplayStrategy, read_panorama_rows};
pub use way_graph::WayGraphStrategy;

use geo::Polygon;
use rstar::{RTree, primitives::GeomWithData};
use serde_json::{Value as JsonValue, json};

use crate::model::WorldPos;

type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// Remaining locations, visited nearest-first
#[derive(Debug, Default)]
struct NearestQueue {
    tree: RTree<IndexedPoint>,
}

impl NearestQueue {
    fn new(points: impl IntoIterator<Item = (usize, WorldPos)>) -> Self {
        let points = points
            .into_iter()
            .map(|(index, p)| GeomWithData::new([p.x, p.y, p.z], index))
            .collect();
        Self {
            tree: RTree::bulk_load(points),
        }
    }

    fn len(&self) -> usize {
        self.tree.size()
    }

    /// Removes and returns the location closest to `from`
    fn pop_nearest(&mut self, from: WorldPos) -> Option<usize> {
        let nearest = self
            .tree
            .nearest_neighbor(&[from.x, from.y, from.z])
            .cloned()?;
        self.tree.remove(&nearest);
        Some(nearest.data)
    }
}

/// `[{"Lon": .., "Lat": ..}, ..]` for the exterior ring, closing vertex
/// omitted
fn polygon_json(bounds: Option<&Polygon<f64>>) -> JsonValue {
    let Some(polygon) = bounds else {
        return json!([]);
    };
    let exterior = polygon.exterior();
    let mut coords = exterior.coords().collect::<Vec<_>>();
    if exterior.is_closed() && coords.len() > 1 {
        coords.pop();
    }
    JsonValue::Array(
        coords
            .into_iter()
            .map(|c| json!({"Lon": c.x, "Lat": c.y}))
            .collect(),
    )
}
