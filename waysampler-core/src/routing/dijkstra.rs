use std::{cmp::Ordering, collections::BinaryHeap};

use hashbrown::{HashMap, HashSet};

use crate::{NodeId, model::RoadGraph, model::WorldPos};

#[derive(Copy, Clone, PartialEq)]
struct State {
    cost: f64,
    node: NodeId,
}

impl Eq for State {}

// Implement Ord for State to use in BinaryHeap
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by cost, lower node id first on equal cost
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single-source shortest path tree over a [`RoadGraph`]
#[derive(Debug, Clone, Default)]
pub(crate) struct ShortestPaths {
    source: NodeId,
    distances: HashMap<NodeId, f64>,
    predecessors: HashMap<NodeId, NodeId>,
}

impl ShortestPaths {
    pub(crate) fn distance(&self, target: NodeId) -> Option<f64> {
        self.distances.get(&target).copied()
    }

    /// Node sequence from the source to `target`, both included
    pub(crate) fn path_to(&self, target: NodeId) -> Option<Vec<NodeId>> {
        if !self.distances.contains_key(&target) {
            return None;
        }
        let mut path = vec![target];
        let mut current = target;
        while current != self.source {
            current = *self.predecessors.get(&current)?;
            path.push(current);
        }
        path.reverse();
        Some(path)
    }
}

/// Dijkstra's algorithm over the road graph with straight-line segment
/// lengths as edge weights.
///
/// `positions` holds the world position of every node. When `targets` is
/// given the search stops as soon as all of them are settled.
pub(crate) fn dijkstra_paths(
    graph: &RoadGraph,
    positions: &[WorldPos],
    start: NodeId,
    targets: Option<&HashSet<NodeId>>,
) -> ShortestPaths {
    let estimated_nodes = graph.node_count().min(1000);
    let mut distances: HashMap<NodeId, f64> = HashMap::with_capacity(estimated_nodes);
    let mut predecessors: HashMap<NodeId, NodeId> = HashMap::with_capacity(estimated_nodes);
    let mut settled: HashSet<NodeId> = HashSet::with_capacity(estimated_nodes);
    let mut remaining = targets.map_or(0, HashSet::len);
    let mut heap = BinaryHeap::with_capacity(estimated_nodes / 4);

    heap.push(State {
        cost: 0.0,
        node: start,
    });
    distances.insert(start, 0.0);

    while let Some(State { cost, node }) = heap.pop() {
        if !settled.insert(node) {
            continue;
        }

        if let Some(targets) = targets {
            if targets.contains(&node) {
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
        }

        for &neighbor in graph.neighbors(node) {
            if settled.contains(&neighbor) {
                continue;
            }
            let next_cost = cost + positions[node].distance(positions[neighbor]);
            let improved = distances
                .get(&neighbor)
                .is_none_or(|&best| next_cost < best);
            if improved {
                distances.insert(neighbor, next_cost);
                predecessors.insert(neighbor, node);
                heap.push(State {
                    cost: next_cost,
                    node: neighbor,
                });
            }
        }
    }

    // Tentative distances of unsettled nodes are upper bounds only
    distances.retain(|node, _| settled.contains(node));

    ShortestPaths {
        source: start,
        distances,
        predecessors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WayKind;

    // 0 - 1 - 2 along the x axis, plus a detour 0 - 3 - 2 above it
    fn detour_graph() -> (RoadGraph, Vec<WorldPos>) {
        let mut graph = RoadGraph::new();
        for _ in 0..4 {
            graph.add_node(0.0, 0.0);
        }
        let way = graph.add_way("main", WayKind::Residential);
        graph.connect(0, 1, way).unwrap();
        graph.connect(1, 2, way).unwrap();
        graph.connect(0, 3, way).unwrap();
        graph.connect(3, 2, way).unwrap();
        let positions = vec![
            WorldPos::new(0.0, 0.0, 0.0),
            WorldPos::new(100.0, 0.0, 0.0),
            WorldPos::new(200.0, 0.0, 0.0),
            WorldPos::new(100.0, 100.0, 0.0),
        ];
        (graph, positions)
    }

    #[test]
    fn test_shortest_path_prefers_straight_route() {
        let (graph, positions) = detour_graph();
        let paths = dijkstra_paths(&graph, &positions, 0, None);

        assert_eq!(paths.distance(2), Some(200.0));
        assert_eq!(paths.path_to(2), Some(vec![0, 1, 2]));
        assert_eq!(paths.path_to(0), Some(vec![0]));
    }

    #[test]
    fn test_unreachable_node() {
        let (mut graph, mut positions) = detour_graph();
        graph.add_node(0.0, 0.0);
        positions.push(WorldPos::new(1000.0, 0.0, 0.0));

        let paths = dijkstra_paths(&graph, &positions, 0, None);
        assert_eq!(paths.distance(4), None);
        assert_eq!(paths.path_to(4), None);
    }

    #[test]
    fn test_search_stops_at_targets() {
        let (graph, positions) = detour_graph();
        let targets = HashSet::from_iter([1]);
        let paths = dijkstra_paths(&graph, &positions, 0, Some(&targets));

        assert_eq!(paths.distance(1), Some(100.0));
        // Node 2 is never settled before the search ends
        assert_eq!(paths.distance(2), None);
    }
}
