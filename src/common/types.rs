//! Common types used throughout path_optimizer

use nalgebra::Vector2;
use std::f64::consts::PI;

/// Vehicle/path pose: position, heading, curvature and arc length.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct State {
    pub x: f64,
    pub y: f64,
    /// Heading [rad], (-pi, pi]
    pub heading: f64,
    /// Curvature [1/m]
    pub curvature: f64,
    /// Arc length from the start of the path [m]
    pub s: f64,
}

impl State {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading, curvature: 0.0, s: 0.0 }
    }

    pub fn with_all(x: f64, y: f64, heading: f64, curvature: f64, s: f64) -> Self {
        Self { x, y, heading, curvature, s }
    }

    pub fn distance(&self, other: &State) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Unit vector pointing to the left of the heading.
    pub fn normal(&self) -> Vector2<f64> {
        Vector2::new(-self.heading.sin(), self.heading.cos())
    }
}

/// Start/end states of the vehicle plus its initial tracking error
/// relative to the reference path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub start: State,
    pub end: State,
    /// Signed lateral offset of the start state [m], positive to the left
    pub initial_offset: f64,
    /// Start heading minus reference heading [rad]
    pub initial_heading_error: f64,
}

impl VehicleState {
    pub fn new(start: State, end: State) -> Self {
        Self {
            start,
            end,
            initial_offset: 0.0,
            initial_heading_error: 0.0,
        }
    }

    pub fn set_initial_error(&mut self, offset: f64, heading_error: f64) {
        self.initial_offset = offset;
        self.initial_heading_error = heading_error;
    }

    pub fn initial_error(&self) -> (f64, f64) {
        (self.initial_offset, self.initial_heading_error)
    }
}

/// Normalize an angle to (-pi, pi].
pub fn normalize_angle(angle: f64) -> f64 {
    if angle > -PI && angle <= PI {
        return angle;
    }
    let a = angle.rem_euclid(2.0 * PI);
    if a > PI {
        a - 2.0 * PI
    } else {
        a
    }
}

/// Express `target` in the frame attached to `origin`.
pub fn global_to_local(origin: &State, target: &State) -> State {
    let dx = target.x - origin.x;
    let dy = target.y - origin.y;
    let (sin, cos) = origin.heading.sin_cos();
    State {
        x: cos * dx + sin * dy,
        y: -sin * dx + cos * dy,
        heading: normalize_angle(target.heading - origin.heading),
        curvature: target.curvature,
        s: target.s,
    }
}
