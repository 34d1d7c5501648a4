//! Undirected road graph: array-backed nodes, symmetric adjacency lists and
//! an edge table mapping each undirected node pair to the way it belongs to.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{GeoPoint, Georeference, Way, WayKind, WorldPos};
use crate::{Error, NodeId, WayId};

/// Graph node, an intersection or way vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub lon: f64,
    pub lat: f64,
}

/// Canonical key of an undirected edge: the node pair ordered low-to-high.
///
/// `EdgeKey::new(a, b) == EdgeKey::new(b, a)` for every pair, and distinct
/// unordered pairs never share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    low: NodeId,
    high: NodeId,
}

impl EdgeKey {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(self) -> NodeId {
        self.low
    }

    pub fn high(self) -> NodeId {
        self.high
    }

    /// Integer form `low * node_count + high`, injective while both ids are
    /// below `node_count`
    pub fn linear(self, node_count: usize) -> u64 {
        self.low as u64 * node_count as u64 + self.high as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "RoadGraphRepr", try_from = "RoadGraphRepr")]
pub struct RoadGraph {
    nodes: Vec<Node>,
    adjacency: Vec<Vec<NodeId>>,
    edges: HashMap<EdgeKey, WayId>,
    ways: Vec<Way>,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, lon: f64, lat: f64) -> NodeId {
        self.nodes.push(Node { lon, lat });
        self.adjacency.push(Vec::new());
        self.nodes.len() - 1
    }

    pub fn add_way(&mut self, name: impl Into<String>, kind: WayKind) -> WayId {
        self.ways.push(Way {
            name: name.into(),
            kind,
        });
        self.ways.len() - 1
    }

    /// Connects two distinct nodes as part of `way`.
    ///
    /// A way index equal to the current way count appends a default way;
    /// anything beyond that is rejected. Connecting an already connected
    /// pair keeps the original way and is otherwise a no-op.
    pub fn connect(&mut self, a: NodeId, b: NodeId, way: WayId) -> Result<(), Error> {
        self.check_node(a)?;
        self.check_node(b)?;
        if a == b {
            return Err(Error::InvalidData(format!("Cannot connect node {a} to itself")));
        }
        if way > self.ways.len() {
            return Err(Error::InvalidData(format!(
                "Way index {way} is beyond the way table ({} ways)",
                self.ways.len()
            )));
        }
        if way == self.ways.len() {
            self.ways.push(Way::default());
        }

        let key = EdgeKey::new(a, b);
        if let Some(existing) = self.edges.get(&key) {
            if *existing != way {
                log::debug!("Edge {a}-{b} already belongs to way {existing}, ignoring way {way}");
            }
            return Ok(());
        }

        self.adjacency[a].push(b);
        self.adjacency[b].push(a);
        self.edges.insert(key, way);
        Ok(())
    }

    /// Way index of an edge
    ///
    /// # Errors
    ///
    /// [`Error::EdgeNotFound`] if the pair is not connected
    pub fn edge_way(&self, key: EdgeKey) -> Result<WayId, Error> {
        self.edges.get(&key).copied().ok_or(Error::EdgeNotFound {
            a: key.low(),
            b: key.high(),
        })
    }

    pub fn are_connected(&self, a: NodeId, b: NodeId) -> bool {
        let connected = self.neighbors(a).contains(&b);
        debug_assert_eq!(connected, self.neighbors(b).contains(&a));
        connected
    }

    /// Nodes adjacent to `node`; empty for unknown nodes
    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        self.adjacency.get(node).map_or(&[], Vec::as_slice)
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.neighbors(node).len()
    }

    pub fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node)
    }

    pub fn way(&self, way: WayId) -> Option<&Way> {
        self.ways.get(way)
    }

    pub fn way_name(&self, way: WayId) -> Option<&str> {
        self.ways.get(way).map(|w| w.name.as_str())
    }

    pub fn update_way_kind(&mut self, way: WayId, kind: WayKind) -> Result<(), Error> {
        let entry = self
            .ways
            .get_mut(way)
            .ok_or_else(|| Error::InvalidData(format!("Unknown way index {way}")))?;
        entry.kind = kind;
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    /// All edges in ascending node order, each reported once
    pub fn edges(&self) -> impl Iterator<Item = (EdgeKey, WayId)> + '_ {
        self.adjacency.iter().enumerate().flat_map(move |(a, neighbors)| {
            neighbors
                .iter()
                .filter(move |&&b| a < b)
                .map(move |&b| {
                    let key = EdgeKey::new(a, b);
                    (key, self.edges[&key])
                })
        })
    }

    /// Projects a node into world space at the georeference's origin height
    pub fn world_position(
        &self,
        node: NodeId,
        georef: &dyn Georeference,
    ) -> Result<WorldPos, Error> {
        let coords = self.node(node).ok_or(Error::InvalidNodeIndex(node))?;
        Ok(georef.to_world(GeoPoint::new(coords.lon, coords.lat, georef.origin_height())))
    }

    fn check_node(&self, node: NodeId) -> Result<(), Error> {
        if node < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::InvalidNodeIndex(node))
        }
    }
}

/// Serialized form of [`RoadGraph`]; JSON maps need string keys, so the edge
/// table is stored as `[low, high, way]` triples.
#[derive(Debug, Serialize, Deserialize)]
struct RoadGraphRepr {
    nodes: Vec<Node>,
    ways: Vec<Way>,
    adjacency: Vec<Vec<NodeId>>,
    edges: Vec<(NodeId, NodeId, WayId)>,
}

impl From<RoadGraph> for RoadGraphRepr {
    fn from(graph: RoadGraph) -> Self {
        let mut edges: Vec<(NodeId, NodeId, WayId)> = graph
            .edges
            .iter()
            .map(|(key, &way)| (key.low(), key.high(), way))
            .collect();
        edges.sort_unstable();

        Self {
            nodes: graph.nodes,
            ways: graph.ways,
            adjacency: graph.adjacency,
            edges,
        }
    }
}

impl TryFrom<RoadGraphRepr> for RoadGraph {
    type Error = Error;

    fn try_from(repr: RoadGraphRepr) -> Result<Self, Error> {
        if repr.adjacency.len() != repr.nodes.len() {
            return Err(Error::InvalidData(format!(
                "Adjacency table has {} entries for {} nodes",
                repr.adjacency.len(),
                repr.nodes.len()
            )));
        }

        let mut edges = HashMap::with_capacity(repr.edges.len());
        for (a, b, way) in repr.edges {
            if a >= repr.nodes.len() || b >= repr.nodes.len() || a == b {
                return Err(Error::InvalidData(format!("Invalid edge {a}-{b}")));
            }
            if way >= repr.ways.len() {
                return Err(Error::InvalidData(format!(
                    "Edge {a}-{b} references unknown way {way}"
                )));
            }
            if edges.insert(EdgeKey::new(a, b), way).is_some() {
                return Err(Error::InvalidData(format!("Duplicate edge {a}-{b}")));
            }
        }

        let mut adjacency_edges = 0;
        for (a, neighbors) in repr.adjacency.iter().enumerate() {
            for &b in neighbors {
                let symmetric = repr.adjacency.get(b).is_some_and(|list| list.contains(&a));
                if !symmetric || !edges.contains_key(&EdgeKey::new(a, b)) {
                    return Err(Error::InvalidData(format!(
                        "Adjacency {a}-{b} is not symmetric or has no edge entry"
                    )));
                }
                adjacency_edges += 1;
            }
        }
        if adjacency_edges != edges.len() * 2 {
            return Err(Error::InvalidData(
                "Edge table does not match adjacency lists".to_string(),
            ));
        }

        Ok(Self {
            nodes: repr.nodes,
            adjacency: repr.adjacency,
            edges,
            ways: repr.ways,
        })
    }
}
