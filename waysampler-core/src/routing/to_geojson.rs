use geo::{Coord, LineString};
use geojson::{Feature, FeatureCollection, Geometry, Value as GeoJsonValue};
use serde_json::json;

use crate::{
    Error,
    model::{Georeference, RoadGraph, Walk},
};

/// Converts walks to a `GeoJSON` `FeatureCollection` of lon/lat line strings,
/// one feature per walk.
///
/// # Errors
///
/// Returns an error if a walk references a node missing from `graph`.
pub fn walks_to_geojson(graph: &RoadGraph, walks: &[Walk]) -> Result<FeatureCollection, Error> {
    let features = walks
        .iter()
        .enumerate()
        .map(|(idx, walk)| walk_feature(graph, idx, walk))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FeatureCollection {
        features,
        bbox: None,
        foreign_members: None,
    })
}

fn walk_feature(graph: &RoadGraph, walk_idx: usize, walk: &Walk) -> Result<Feature, Error> {
    let coords = walk
        .nodes
        .iter()
        .map(|&node| {
            graph
                .node(node)
                .map(|n| Coord { x: n.lon, y: n.lat })
                .ok_or(Error::InvalidNodeIndex(node))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let geometry = Geometry::new(GeoJsonValue::from(&LineString::new(coords)));

    let value = json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": {
            "walk_index": walk_idx,
            "node_count": walk.len(),
            "segment_count": walk.segment_count(),
        }
    });

    serde_json::from_value::<Feature>(value).map_err(|e| Error::GeoJsonError(e.to_string()))
}

/// Sum of world-space segment lengths over all walks, duplicated
/// traversals included
///
/// # Errors
///
/// Returns an error if a walk references a node missing from `graph`.
pub fn total_walk_length(
    graph: &RoadGraph,
    walks: &[Walk],
    georef: &dyn Georeference,
) -> Result<f64, Error> {
    let mut total = 0.0;
    for walk in walks {
        for (a, b) in walk.segments() {
            let from = graph.world_position(a, georef)?;
            let to = graph.world_position(b, georef)?;
            total += from.distance(to);
        }
    }
    Ok(total)
}
