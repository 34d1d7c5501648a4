//! Route-covering walks (route inspection / Chinese postman).
//!
//! Each connected component with at least one edge yields exactly one walk
//! traversing every edge of the component at least once. The construction is
//! deterministic for a given graph:
//!
//! 1. Components are found with a union-find and visited in order of their
//!    lowest node id.
//! 2. Odd-degree vertices are matched greedily by ascending
//!    `(network distance, lower id, higher id)` until two remain. The shortest
//!    path of every matched pair is duplicated in the walk multigraph.
//! 3. The two unmatched odd vertices become the endpoints of an open walk
//!    starting at the lower id. A component without odd vertices yields a
//!    circuit from its lowest node id.
//! 4. Hierholzer's algorithm always leaves a vertex through the unused edge
//!    with the lowest neighbour id, then the lowest edge index.

use fixedbitset::FixedBitSet;
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use log::{debug, info};
use petgraph::{
    graph::{NodeIndex, UnGraph},
    unionfind::UnionFind,
    visit::EdgeRef,
};
use rayon::prelude::*;

use super::dijkstra::{ShortestPaths, dijkstra_paths};
use crate::{
    Error, NodeId,
    model::{Georeference, RoadGraph, Walk, WorldPos},
};

/// Computes walks that collectively traverse every edge of `graph`.
///
/// Edge weights are the straight-line world distances between node
/// positions as placed by `georef`.
///
/// # Errors
///
/// Returns an error if a node cannot be projected or if the graph is
/// internally inconsistent.
pub fn solve_route_cover(
    graph: &RoadGraph,
    georef: &dyn Georeference,
) -> Result<Vec<Walk>, Error> {
    let positions = (0..graph.node_count())
        .map(|node| graph.world_position(node, georef))
        .collect::<Result<Vec<_>, _>>()?;

    let components = connected_components(graph);
    let mut walks = Vec::with_capacity(components.len());
    let mut total_odd = 0usize;
    let mut duplicated_length = 0.0;

    for component in &components {
        let cover = cover_component(graph, &positions, component)?;
        total_odd += cover.odd_vertices;
        duplicated_length += cover.duplicated_length;
        walks.push(cover.walk);
    }

    info!(
        "Route cover: {} walks over {} edges, {} odd vertices, {:.1} units duplicated",
        walks.len(),
        graph.edge_count(),
        total_odd,
        duplicated_length
    );

    Ok(walks)
}

/// Node sets of all components that contain at least one edge, each sorted
/// ascending, ordered by their lowest node id
fn connected_components(graph: &RoadGraph) -> Vec<Vec<NodeId>> {
    let mut union_find = UnionFind::<usize>::new(graph.node_count());
    for (key, _) in graph.edges() {
        union_find.union(key.low(), key.high());
    }

    let mut slots: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<NodeId>> = Vec::new();
    for node in (0..graph.node_count()).filter(|&node| graph.degree(node) > 0) {
        let root = union_find.find(node);
        let slot = *slots.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[slot].push(node);
    }
    components
}

struct ComponentCover {
    walk: Walk,
    odd_vertices: usize,
    duplicated_length: f64,
}

fn cover_component(
    graph: &RoadGraph,
    positions: &[WorldPos],
    component: &[NodeId],
) -> Result<ComponentCover, Error> {
    let odd = component
        .iter()
        .copied()
        .filter(|&node| graph.degree(node) % 2 == 1)
        .collect::<Vec<_>>();

    let (matching, endpoints) = match_odd_vertices(graph, positions, &odd)?;

    // Local multigraph over the component; component is sorted, so local
    // indices preserve the global id order.
    let local: HashMap<NodeId, NodeIndex> = component
        .iter()
        .enumerate()
        .map(|(i, &node)| (node, NodeIndex::new(i)))
        .collect();
    let mut multigraph: UnGraph<NodeId, ()> =
        UnGraph::with_capacity(component.len(), component.len() * 2);
    for &node in component {
        multigraph.add_node(node);
    }

    let members: HashSet<NodeId> = component.iter().copied().collect();
    for (key, _) in graph.edges().filter(|(key, _)| members.contains(&key.low())) {
        multigraph.add_edge(local[&key.low()], local[&key.high()], ());
    }

    let mut duplicated_length = 0.0;
    for path in &matching {
        for (a, b) in path.iter().copied().tuple_windows() {
            if !graph.are_connected(a, b) {
                return Err(Error::EdgeNotFound { a, b });
            }
            duplicated_length += positions[a].distance(positions[b]);
            multigraph.add_edge(local[&a], local[&b], ());
        }
    }

    let start = endpoints.map_or(component[0], |(a, b)| a.min(b));
    let nodes = eulerian_trail(&multigraph, local[&start]);

    debug!(
        "Component of {} nodes: {} odd vertices, {} trail steps",
        component.len(),
        odd.len(),
        nodes.len().saturating_sub(1)
    );

    if nodes.len() != multigraph.edge_count() + 1 {
        return Err(Error::InvalidData(format!(
            "Eulerian trail covered {} of {} edges",
            nodes.len().saturating_sub(1),
            multigraph.edge_count()
        )));
    }

    Ok(ComponentCover {
        walk: Walk::new(nodes.into_iter().map(|i| multigraph[i]).collect()),
        odd_vertices: odd.len(),
        duplicated_length,
    })
}

type Matching = (Vec<Vec<NodeId>>, Option<(NodeId, NodeId)>);

/// Greedy pairing of odd vertices.
///
/// Returns the shortest paths of the matched pairs and the two vertices left
/// unmatched, if any.
fn match_odd_vertices(
    graph: &RoadGraph,
    positions: &[WorldPos],
    odd: &[NodeId],
) -> Result<Matching, Error> {
    match odd.len() {
        0 => return Ok((Vec::new(), None)),
        2 => return Ok((Vec::new(), Some((odd[0], odd[1])))),
        _ => {}
    }

    let targets: HashSet<NodeId> = odd.iter().copied().collect();
    let trees: Vec<ShortestPaths> = odd
        .par_iter()
        .map(|&source| dijkstra_paths(graph, positions, source, Some(&targets)))
        .collect();

    let mut candidates = Vec::with_capacity(odd.len() * (odd.len() - 1) / 2);
    for (i, j) in (0..odd.len()).tuple_combinations() {
        let distance = trees[i]
            .distance(odd[j])
            .ok_or(Error::EdgeNotFound { a: odd[i], b: odd[j] })?;
        candidates.push((distance, i, j));
    }
    candidates.sort_by(|x, y| {
        x.0.total_cmp(&y.0)
            .then_with(|| odd[x.1].cmp(&odd[y.1]))
            .then_with(|| odd[x.2].cmp(&odd[y.2]))
    });

    let mut matched = FixedBitSet::with_capacity(odd.len());
    let mut unmatched = odd.len();
    let mut paths = Vec::with_capacity(odd.len() / 2);
    for (_, i, j) in candidates {
        if unmatched <= 2 {
            break;
        }
        if matched.contains(i) || matched.contains(j) {
            continue;
        }
        matched.insert(i);
        matched.insert(j);
        unmatched -= 2;
        let path = trees[i]
            .path_to(odd[j])
            .ok_or(Error::EdgeNotFound { a: odd[i], b: odd[j] })?;
        paths.push(path);
    }

    let mut rest = (0..odd.len()).filter(|&i| !matched.contains(i));
    let endpoints = match (rest.next(), rest.next()) {
        (Some(i), Some(j)) => Some((odd[i], odd[j])),
        _ => None,
    };

    Ok((paths, endpoints))
}

/// Hierholzer's algorithm on a multigraph whose vertices all have even
/// degree, except possibly `start` and one other vertex.
fn eulerian_trail(graph: &UnGraph<NodeId, ()>, start: NodeIndex) -> Vec<NodeIndex> {
    // Incident edges per vertex, sorted by (neighbour, edge index)
    let incident: Vec<Vec<(NodeIndex, usize)>> = graph
        .node_indices()
        .map(|node| {
            let mut edges = graph
                .edges(node)
                .map(|edge| {
                    let other = if edge.source() == node {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    (other, edge.id().index())
                })
                .collect::<Vec<_>>();
            edges.sort_unstable();
            edges
        })
        .collect();

    let mut used = FixedBitSet::with_capacity(graph.edge_count());
    let mut cursor = vec![0usize; graph.node_count()];
    let mut stack = vec![start];
    let mut trail = Vec::with_capacity(graph.edge_count() + 1);

    while let Some(&node) = stack.last() {
        let edges = &incident[node.index()];
        let position = &mut cursor[node.index()];
        while *position < edges.len() && used.contains(edges[*position].1) {
            *position += 1;
        }
        if let Some(&(next, edge)) = edges.get(*position) {
            used.insert(edge);
            stack.push(next);
        } else {
            trail.push(node);
            stack.pop();
        }
    }

    trail.reverse();
    trail
}
