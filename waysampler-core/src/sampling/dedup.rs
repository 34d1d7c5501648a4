use hashbrown::HashSet;

use crate::{WayId, model::WorldPos};

/// Coarse spatial bucket plus road identity.
///
/// Samples on different ways never share a key, even when they are
/// spatially co-located (bridges over streets, parallel carriageways).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub cell_x: i64,
    pub cell_y: i64,
    pub way: WayId,
}

impl DedupKey {
    pub fn new(location: WorldPos, cell_size: f64, way: WayId) -> Self {
        Self {
            cell_x: (location.x / cell_size).floor() as i64,
            cell_y: (location.y / cell_size).floor() as i64,
            way,
        }
    }
}

/// Set of already emitted sample buckets. Grows for the lifetime of a
/// session and is only cleared on (re)initialization.
#[derive(Debug, Clone, Default)]
pub struct SpatialDedupIndex {
    keys: HashSet<DedupKey>,
}

impl SpatialDedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `true` if the key was not present yet
    pub fn insert(&mut self, key: DedupKey) -> bool {
        self.keys.insert(key)
    }

    pub fn reset(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
