use crate::model::WorldPos;

/// Closest blocking hit along a ray segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub location: WorldPos,
    /// Distance from the ray origin to `location`
    pub distance: f64,
}

/// Ground/obstruction query collaborator. Implemented by whatever owns the
/// scene geometry.
pub trait RayQuery: Send + Sync {
    /// Closest hit on the segment `from -> to`, if any
    fn raycast(&self, from: WorldPos, to: WorldPos) -> Option<Hit>;
}

/// Infinite horizontal ground plane at `height` with nothing on it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlatGround {
    pub height: f64,
}

impl FlatGround {
    pub fn new(height: f64) -> Self {
        Self { height }
    }
}

impl RayQuery for FlatGround {
    fn raycast(&self, from: WorldPos, to: WorldPos) -> Option<Hit> {
        let (above_from, above_to) = (from.z - self.height, to.z - self.height);
        if above_from.signum() == above_to.signum() && above_from != 0.0 && above_to != 0.0 {
            return None;
        }
        let delta = to - from;
        let t = if delta.z == 0.0 {
            0.0
        } else {
            (self.height - from.z) / delta.z
        };
        let location = from + delta * t;
        Some(Hit {
            location,
            distance: from.distance(location),
        })
    }
}
