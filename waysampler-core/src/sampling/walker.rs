use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, trace};

use super::{
    Candidate, CandidateStep, DedupKey, SkipReason, SpatialDedupIndex, StreetData,
    naming::location_image_name,
};
use crate::{
    Error, WayId,
    loading::{ImageNaming, SamplerConfig},
    model::{EdgeKey, Georeference, Pose, Rotation, Walk, WorldPos},
};

/// Traversal state of a [`SampleWalker`]
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCursor {
    pub walk: usize,
    /// Index of the segment's first node within the walk
    pub segment: usize,
    /// Arc length from the walk start to the start of `segment`
    pub segment_start_distance: f64,
    /// Arc length of the last sample within the walk
    pub walk_distance: f64,
    pub location: WorldPos,
    pub way: WayId,
    pub rotation: Rotation,
}

impl SampleCursor {
    fn at_walk_start(walk: usize, location: WorldPos) -> Self {
        Self {
            walk,
            segment: 0,
            segment_start_distance: 0.0,
            walk_distance: 0.0,
            location,
            way: 0,
            rotation: Rotation::default(),
        }
    }
}

/// Advances along the walks in fixed arc-length steps, producing candidate
/// poses and suppressing near-duplicates.
pub struct SampleWalker {
    data: Arc<StreetData>,
    positions: Vec<WorldPos>,
    sample_distance: f64,
    cell_size: f64,
    naming: ImageNaming,
    images_dir: Option<PathBuf>,
    cursor: SampleCursor,
    dedup: SpatialDedupIndex,
    finished: bool,
}

impl SampleWalker {
    /// Creates a walker positioned at the start of the first walk.
    ///
    /// `images_dir` enables the resume check for location-named images.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a walk refers to
    /// a node missing from the graph.
    pub fn new(
        data: Arc<StreetData>,
        georef: &dyn Georeference,
        config: &SamplerConfig,
        images_dir: Option<PathBuf>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let positions = (0..data.graph.node_count())
            .map(|node| data.graph.world_position(node, georef))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(&node) = data
            .walks
            .iter()
            .flat_map(|walk| walk.nodes.iter())
            .find(|&&node| node >= positions.len())
        {
            return Err(Error::InvalidNodeIndex(node));
        }

        let mut walker = Self {
            data,
            positions,
            sample_distance: config.sample_distance,
            cell_size: config.dedup_cell_size(),
            naming: config.image_naming,
            images_dir,
            cursor: SampleCursor::at_walk_start(0, WorldPos::ZERO),
            dedup: SpatialDedupIndex::new(),
            finished: false,
        };
        walker.reset();
        Ok(walker)
    }

    /// Rewinds to the start of the first walk and clears the dedup index
    pub fn reset(&mut self) {
        let start = self.walk_start(0).unwrap_or(WorldPos::ZERO);
        self.cursor = SampleCursor::at_walk_start(0, start);
        self.dedup.reset();
        self.finished = self.data.walks.is_empty();
    }

    pub fn cursor(&self) -> &SampleCursor {
        &self.cursor
    }

    pub fn dedup_index(&self) -> &SpatialDedupIndex {
        &self.dedup
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Pulls candidates until one survives the dedup and resume checks.
    /// `None` once all walks are exhausted.
    ///
    /// # Errors
    ///
    /// Fails if a walk uses a pair of nodes that is not an edge.
    pub fn next_candidate(&mut self) -> Result<Option<Candidate>, Error> {
        loop {
            match self.next_step()? {
                CandidateStep::Candidate(candidate) => return Ok(Some(candidate)),
                CandidateStep::Skipped(_) => {}
                CandidateStep::Exhausted => return Ok(None),
            }
        }
    }

    /// Advances the cursor by one sample distance.
    ///
    /// When the end of a walk is reached without covering a full step, the
    /// walk's last node is offered as a final sample. The dedup index is
    /// updated before the step is returned.
    ///
    /// # Errors
    ///
    /// Fails if a walk uses a pair of nodes that is not an edge.
    pub fn next_step(&mut self) -> Result<CandidateStep, Error> {
        if self.finished {
            return Ok(CandidateStep::Exhausted);
        }

        while self.cursor.segment + 1 >= self.current_walk().nodes.len() {
            let next = self.cursor.walk + 1;
            let Some(start) = self.walk_start(next) else {
                if next >= self.data.walks.len() {
                    self.finished = true;
                    debug!("All {} walks exhausted", self.data.walks.len());
                    return Ok(CandidateStep::Exhausted);
                }
                // Empty walk
                self.cursor = SampleCursor::at_walk_start(next, self.cursor.location);
                continue;
            };
            self.cursor = SampleCursor {
                way: self.cursor.way,
                rotation: self.cursor.rotation,
                ..SampleCursor::at_walk_start(next, start)
            };
        }

        let previous_location = self.cursor.location;
        let previous_way = self.cursor.way;
        let target = self.cursor.walk_distance + self.sample_distance;
        let mut segment_end = self.cursor.segment_start_distance;

        let data = Arc::clone(&self.data);
        let nodes = &data.walks[self.cursor.walk].nodes;
        while self.cursor.segment + 1 < nodes.len() {
            let (a, b) = (nodes[self.cursor.segment], nodes[self.cursor.segment + 1]);
            let (start, end) = (self.positions[a], self.positions[b]);
            let length = start.distance(end);

            self.cursor.segment_start_distance = segment_end;
            segment_end += length;

            // The tail sample of a walk takes the way and heading of its
            // last segment
            self.cursor.way = data.graph.edge_way(EdgeKey::new(a, b))?;
            if length > 0.0 {
                self.cursor.rotation = Rotation::from_direction(end - start);
            }

            if target <= segment_end {
                let alpha = if length > 0.0 {
                    (target - self.cursor.segment_start_distance) / length
                } else {
                    1.0
                };
                self.cursor.location = start.lerp(end, alpha);
                break;
            }

            self.cursor.location = end;
            self.cursor.segment += 1;
        }
        self.cursor.walk_distance = target;

        let location = self.cursor.location;
        let way = self.cursor.way;
        let key = DedupKey::new(location, self.cell_size, way);
        if self.dedup.contains(&key) {
            trace!("Skipping duplicate sample at {location:?} on way {way}");
            return Ok(CandidateStep::Skipped(SkipReason::Duplicate));
        }
        self.dedup.insert(key);
        self.dedup
            .insert(DedupKey::new(previous_location, self.cell_size, way));
        self.dedup
            .insert(DedupKey::new(location, self.cell_size, previous_way));

        let image_name = match self.naming {
            ImageNaming::Location => Some(location_image_name(location, way)),
            ImageNaming::Utm => None,
        };
        if let (Some(dir), Some(name)) = (&self.images_dir, &image_name) {
            if dir.join(name).exists() {
                trace!("Skipping already captured sample {name}");
                return Ok(CandidateStep::Skipped(SkipReason::AlreadyCaptured));
            }
        }

        Ok(CandidateStep::Candidate(Candidate {
            pose: Pose::new(location, self.cursor.rotation),
            way: Some(way),
            street_name: data.graph.way_name(way).unwrap_or_default().to_string(),
            image_name,
            image_dir: None,
        }))
    }

    fn current_walk(&self) -> &Walk {
        static EMPTY: Walk = Walk { nodes: Vec::new() };
        self.data.walks.get(self.cursor.walk).unwrap_or(&EMPTY)
    }

    fn walk_start(&self, walk: usize) -> Option<WorldPos> {
        let first = *self.data.walks.get(walk)?.nodes.first()?;
        Some(self.positions[first])
    }
}
