use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Ordered node visits forming one continuous traversal. Nodes and edges may
/// repeat.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Walk {
    pub nodes: Vec<NodeId>,
}

impl Walk {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of traversed edges
    pub fn segment_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Consecutive node pairs
    pub fn segments(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.nodes.iter().copied().tuple_windows()
    }
}
