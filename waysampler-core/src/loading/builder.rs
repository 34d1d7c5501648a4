use std::path::Path;

use geo::{Contains, Point, Polygon};
use hashbrown::HashMap;
use log::info;

use super::overpass::OverpassResponse;
use crate::{Error, NodeId, WayId, model::RoadGraph, model::WayKind};

/// Builds a road graph from an Overpass response.
///
/// OSM node ids are remapped to dense ids in order of first use. Nodes
/// without coordinates, or outside `bounds` when given, are dropped together
/// with the segments touching them. Ways without a usable segment are not
/// added.
pub fn road_graph_from_overpass(
    response: &OverpassResponse,
    bounds: Option<&Polygon<f64>>,
) -> RoadGraph {
    let mut coordinates: HashMap<i64, (f64, f64)> = HashMap::new();
    let mut outside = 0usize;
    for element in response.elements.iter().filter(|e| e.is_node()) {
        let (Some(lon), Some(lat)) = (element.lon, element.lat) else {
            continue;
        };
        if !lon.is_finite() || !lat.is_finite() {
            continue;
        }
        if let Some(polygon) = bounds {
            if !polygon.contains(&Point::new(lon, lat)) {
                outside += 1;
                continue;
            }
        }
        coordinates.insert(element.id, (lon, lat));
    }

    let mut graph = RoadGraph::new();
    let mut dense_ids: HashMap<i64, NodeId> = HashMap::with_capacity(coordinates.len());
    let mut way_count = 0usize;

    for element in response.elements.iter().filter(|e| e.is_way()) {
        let mut way_index: Option<WayId> = None;

        for pair in element.nodes.windows(2) {
            let (osm_a, osm_b) = (pair[0], pair[1]);
            if osm_a == osm_b {
                continue;
            }
            let (Some(&coords_a), Some(&coords_b)) =
                (coordinates.get(&osm_a), coordinates.get(&osm_b))
            else {
                continue;
            };

            let a = *dense_ids
                .entry(osm_a)
                .or_insert_with(|| graph.add_node(coords_a.0, coords_a.1));
            let b = *dense_ids
                .entry(osm_b)
                .or_insert_with(|| graph.add_node(coords_b.0, coords_b.1));

            let way = *way_index.get_or_insert_with(|| {
                way_count += 1;
                graph.add_way(
                    element.tag("name").unwrap_or_default(),
                    element
                        .tag("highway")
                        .map(WayKind::from_highway_tag)
                        .unwrap_or_default(),
                )
            });

            if let Err(e) = graph.connect(a, b, way) {
                log::warn!("Skipping segment {osm_a}-{osm_b} of way {}: {e}", element.id);
            }
        }
    }

    if outside > 0 {
        info!("Dropped {outside} nodes outside the bounding polygon");
    }
    info!(
        "Built road graph with {} nodes, {} edges and {} ways",
        graph.node_count(),
        graph.edge_count(),
        way_count
    );

    graph
}

/// Reads a previously fetched Overpass JSON document and builds the graph
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not an Overpass document
pub fn road_graph_from_overpass_file(
    path: &Path,
    bounds: Option<&Polygon<f64>>,
) -> Result<RoadGraph, Error> {
    info!("Reading map data from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Failed to open map data '{}': {e}", path.display()),
        )
    })?;

    let response = OverpassResponse::from_json_str(&content)?;
    drop(content);
    let graph = road_graph_from_overpass(&response, bounds);
    drop(response);

    // Parsing large Overpass documents allocates a lot of short-lived memory
    // which glibc does not always hand back to the system. This releases the
    // free memory at the tail of the heap.
    //
    // # Safety
    //
    // This call is safe to use on linux with glibc implementation
    // which is checked by the cfg attribute in compile time.
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    unsafe {
        if libc::malloc_trim(0) == 0 {
            log::debug!("Memory trimming released nothing");
        } else {
            log::debug!("Successfully trimmed unused heap memory");
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;
    use crate::model::EdgeKey;

    fn sample_response() -> OverpassResponse {
        OverpassResponse::from_json_str(
            r#"{"elements": [
                {"type": "node", "id": 100, "lat": 0.0, "lon": 0.0},
                {"type": "node", "id": 200, "lat": 0.0, "lon": 1.0},
                {"type": "node", "id": 300, "lat": 0.0, "lon": 2.0},
                {"type": "node", "id": 400, "lat": 5.0, "lon": 5.0},
                {"type": "way", "id": 1, "nodes": [100, 200, 300],
                 "tags": {"highway": "residential", "name": "Main Street"}},
                {"type": "way", "id": 2, "nodes": [300, 400],
                 "tags": {"highway": "hovercraft_lane"}},
                {"type": "way", "id": 3, "nodes": [100, 999],
                 "tags": {"highway": "primary", "name": "Ghost Road"}}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_builds_dense_graph() {
        let graph = road_graph_from_overpass(&sample_response(), None);

        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        // Way 3 references a missing node and is never added
        assert_eq!(graph.way_count(), 2);

        assert_eq!(graph.way_name(0), Some("Main Street"));
        assert_eq!(graph.way(0).unwrap().kind, WayKind::Residential);
        // Unknown class and missing name fall back to defaults
        assert_eq!(graph.way_name(1), Some(""));
        assert_eq!(graph.way(1).unwrap().kind, WayKind::Unclassified);

        assert_eq!(graph.edge_way(EdgeKey::new(0, 1)).unwrap(), 0);
        assert_eq!(graph.edge_way(EdgeKey::new(2, 3)).unwrap(), 1);
    }

    #[test]
    fn test_bounding_polygon_filters_nodes() {
        let bounds = polygon![
            (x: -0.5, y: -0.5),
            (x: 2.5, y: -0.5),
            (x: 2.5, y: 0.5),
            (x: -0.5, y: 0.5),
        ];
        let graph = road_graph_from_overpass(&sample_response(), Some(&bounds));

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.way_count(), 1);
    }

    #[test]
    fn test_empty_response() {
        let graph = road_graph_from_overpass(&OverpassResponse::default(), None);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }
}
