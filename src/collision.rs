//! Covering-circle collision checker
//!
//! The vehicle footprint is approximated by four circles placed along the
//! vehicle's longitudinal axis.

use crate::common::traits::{CollisionCheck, ObstacleMap};
use crate::common::types::State;
use crate::config::Config;

#[derive(Debug, Clone)]
pub struct CollisionChecker {
    /// Longitudinal offsets of the circle centers from the rear axle [m]
    offsets: [f64; 4],
    radius: f64,
}

impl CollisionChecker {
    pub fn new(config: &Config) -> Self {
        Self {
            offsets: config.circle_offsets(),
            radius: config.circle_radius,
        }
    }

    /// Circle centers of the vehicle at `state`
    pub fn circle_centers(&self, state: &State) -> [(f64, f64); 4] {
        let (sin, cos) = state.heading.sin_cos();
        let mut centers = [(0.0, 0.0); 4];
        for (center, l) in centers.iter_mut().zip(self.offsets.iter()) {
            *center = (state.x + l * cos, state.y + l * sin);
        }
        centers
    }
}

impl CollisionCheck for CollisionChecker {
    fn is_state_collision_free(&self, map: &dyn ObstacleMap, state: &State) -> bool {
        self.circle_centers(state)
            .iter()
            .all(|&(x, y)| map.obstacle_distance(x, y) > self.radius)
    }
}
