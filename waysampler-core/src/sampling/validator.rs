use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ray::RayQuery;
use crate::model::{Pose, Rotation, WorldPos};

/// Constants of the placement checks, in world units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSettings {
    /// Camera height above the ground hit
    pub ground_clearance: f64,
    /// Half length of the vertical ground probe
    pub max_height_difference: f64,
    pub check_obstructions: bool,
    /// Number of horizontal rays in the obstruction ring
    pub obstruction_trace_count: usize,
    /// Length of the ring rays and distance kept from their hits
    pub obstruction_clearance: f64,
    /// Spacing of the 3x3 artifact probe grid
    pub artifact_grid_spacing: f64,
    pub artifact_trace_depth: f64,
    pub focus: FocusSettings,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            ground_clearance: 250.0,
            max_height_difference: 100_000.0,
            check_obstructions: true,
            obstruction_trace_count: 32,
            obstruction_clearance: 800.0,
            artifact_grid_spacing: 75.0,
            artifact_trace_depth: 10_000.0,
            focus: FocusSettings::default(),
        }
    }
}

/// Forward focal-point probe used to re-aim cameras placed around a
/// reference pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusSettings {
    pub probe_distance: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    /// Focal distance when the probe hits nothing
    pub fallback_distance: f64,
    /// Extra camera height on top of the ground clearance
    pub camera_height: f64,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            probe_distance: 5000.0,
            min_distance: 1000.0,
            max_distance: 5000.0,
            fallback_distance: 2500.0,
            camera_height: 200.0,
        }
    }
}

/// Accepted camera placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub pose: Pose,
    /// Fraction of artifact probes that hit nothing, in `[0, 1]`
    pub artifact_probability: f64,
}

/// Terrain and obstruction checks for candidate poses
#[derive(Clone)]
pub struct PlacementValidator {
    rays: Arc<dyn RayQuery>,
    settings: PlacementSettings,
}

impl std::fmt::Debug for PlacementValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementValidator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PlacementValidator {
    pub fn new(rays: Arc<dyn RayQuery>, settings: PlacementSettings) -> Self {
        Self { rays, settings }
    }

    pub fn settings(&self) -> &PlacementSettings {
        &self.settings
    }

    /// Ground-anchors the candidate and, if enabled, moves it away from
    /// nearby obstructions. `None` if no ground is found.
    pub fn validate(&self, candidate: &Pose) -> Option<Placement> {
        self.place(candidate, self.settings.check_obstructions)
    }

    /// Ground-anchors the candidate without the obstruction ring
    pub fn validate_ground_only(&self, candidate: &Pose) -> Option<Placement> {
        self.place(candidate, false)
    }

    fn place(&self, candidate: &Pose, obstructions: bool) -> Option<Placement> {
        let grounded = self.ground_point(candidate.location)?;
        // Probes keep the unadjusted XY but start from the anchored height
        let artifact_probability =
            self.artifact_probability(candidate.location.with_z(grounded.z));

        let mut location = grounded;

        if obstructions {
            if let Some(center) = self.clearance_center(location) {
                location = center;
            }
            location = self.ground_point(location)?;
        }

        Some(Placement {
            pose: Pose::new(location, candidate.rotation),
            artifact_probability,
        })
    }

    /// Re-aims `placement` at a focal point in front of `reference`.
    ///
    /// The focal distance comes from a forward probe along the reference
    /// heading, clamped to the configured range, and the camera is raised by
    /// the focus camera height.
    pub fn look_at_focus(&self, reference: &Pose, placement: Placement) -> Placement {
        let focus = &self.settings.focus;
        let origin = reference.location.with_z(placement.pose.location.z);
        let forward = reference.rotation.forward();

        let focal_distance = self
            .rays
            .raycast(origin, origin + forward * focus.probe_distance)
            .map_or(focus.fallback_distance, |hit| {
                hit.distance.clamp(focus.min_distance, focus.max_distance)
            });
        let focal_point = origin + forward * focal_distance;

        Placement {
            pose: Pose::new(
                placement.pose.location + WorldPos::UP * focus.camera_height,
                Rotation::from_direction(focal_point - placement.pose.location),
            ),
            artifact_probability: placement.artifact_probability,
        }
    }

    /// Fraction of a 3x3 grid of top-down probes around `location` that hit
    /// nothing. High values mean the point is likely inside or under
    /// geometry, or over a hole in partially loaded terrain.
    pub fn artifact_probability(&self, location: WorldPos) -> f64 {
        let spacing = self.settings.artifact_grid_spacing;
        let depth = WorldPos::UP * self.settings.artifact_trace_depth;

        let mut misses = 0usize;
        for dy in [-1.0, 0.0, 1.0] {
            for dx in [-1.0, 0.0, 1.0] {
                let from = location + WorldPos::new(dx * spacing, dy * spacing, 0.0);
                if self.rays.raycast(from, from - depth).is_none() {
                    misses += 1;
                }
            }
        }
        misses as f64 / 9.0
    }

    fn ground_point(&self, location: WorldPos) -> Option<WorldPos> {
        let reach = WorldPos::UP * self.settings.max_height_difference;
        self.rays
            .raycast(location + reach, location - reach)
            .map(|hit| hit.location + WorldPos::UP * self.settings.ground_clearance)
    }

    /// Centroid of the clearance points of all ring hits around `location`:
    /// each hit pushed back towards the ring centre by the clearance
    /// distance. `None` if the ring is unobstructed.
    fn clearance_center(&self, location: WorldPos) -> Option<WorldPos> {
        let count = self.settings.obstruction_trace_count;
        let clearance = self.settings.obstruction_clearance;
        if count == 0 {
            return None;
        }

        let mut sum = WorldPos::ZERO;
        let mut hits = 0usize;
        for index in 0..count {
            let yaw = index as f64 * 360.0 / count as f64;
            let end = location + Rotation::new(yaw, 0.0, 0.0).forward() * clearance;
            if let Some(hit) = self.rays.raycast(location, end) {
                let back = (location - end).normalized_or_zero();
                sum += hit.location + back * clearance;
                hits += 1;
            }
        }

        (hits > 0).then(|| sum / hits as f64)
    }
}
