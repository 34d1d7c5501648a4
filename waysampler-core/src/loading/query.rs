use geo::Polygon;
use itertools::Itertools;

use crate::model::WayKind;

/// Default server-side timeout, in seconds, for a road-network query
pub const DEFAULT_QUERY_TIMEOUT: u32 = 90;

/// Builds an Overpass QL query that returns every way of the given classes
/// inside `polygon`, together with the nodes those ways reference.
///
/// The polygon is expected in lon/lat order (`x` = longitude); Overpass
/// wants `lat lon` pairs, and the closing vertex is omitted.
pub fn build_overpass_query(polygon: &Polygon<f64>, kinds: &[WayKind], timeout: u32) -> String {
    let kinds = if kinds.is_empty() {
        &WayKind::ALL[..]
    } else {
        kinds
    };
    let classes = kinds.iter().map(|kind| kind.highway_tag()).join("|");

    let exterior = polygon.exterior();
    let mut coords = exterior.coords().collect::<Vec<_>>();
    if exterior.is_closed() && coords.len() > 1 {
        coords.pop();
    }
    let poly = coords
        .iter()
        .map(|c| format!("{:.7} {:.7}", c.y, c.x))
        .join(" ");

    format!(
        "[out:json][timeout:{timeout}];\n\
         (\n  way[\"highway\"~\"^({classes})$\"](poly:\"{poly}\");\n);\n\
         (._;>;);\nout body;"
    )
}
