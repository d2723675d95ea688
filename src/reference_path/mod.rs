//! Reference path: continuous curve plus its discretized samples
//!
//! The curve is stored as two arc-length parameterized splines `x(s)` and
//! `y(s)` valid over `[0, length]`. Sample arrays (arc length, curvature,
//! heading, position, lateral bounds) always have equal size.

pub mod smoother;

pub use smoother::SplineSmoother;

use log::{debug, warn};

use crate::common::error::{OptimizerError, OptimizerResult};
use crate::common::traits::ObstacleMap;
use crate::common::types::State;
use crate::config::Config;
use crate::utils::spline::{chord_lengths, curve_curvature, curve_heading, Spline};

/// Consecutive samples closer than this are merged.
const MIN_SAMPLE_GAP: f64 = 1e-6;

#[derive(Debug, Clone, Default)]
pub struct ReferencePath {
    x_s: Spline,
    y_s: Spline,
    length: f64,
    s: Vec<f64>,
    k: Vec<f64>,
    heading: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
    bounds: Vec<(f64, f64)>,
    abnormal_bounds: Vec<(State, f64, f64)>,
}

impl ReferencePath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Install the continuous curve; samples are cleared.
    pub fn set_spline(&mut self, x_s: Spline, y_s: Spline, length: f64) -> OptimizerResult<()> {
        let range = x_s.range().zip(y_s.range());
        match range {
            Some(((x0, x1), (y0, y1))) if length >= 0.0 && x0 <= 0.0 && y0 <= 0.0 => {
                if length > x1.min(y1) + 1e-9 {
                    return Err(OptimizerError::InvalidParameter(format!(
                        "reference length {:.3} exceeds the spline range {:.3}",
                        length,
                        x1.min(y1)
                    )));
                }
            }
            _ => {
                return Err(OptimizerError::InvalidParameter(
                    "reference splines must be fitted from s = 0".to_string(),
                ))
            }
        }
        self.clear();
        self.x_s = x_s;
        self.y_s = y_s;
        self.length = length;
        Ok(())
    }

    /// Use a point sequence directly as the reference: the splines are fitted
    /// through the points by chord length and the points become the samples.
    pub fn set_reference(&mut self, points: &[State]) -> OptimizerResult<()> {
        let mut x: Vec<f64> = Vec::with_capacity(points.len());
        let mut y: Vec<f64> = Vec::with_capacity(points.len());
        for p in points {
            if let (Some(&lx), Some(&ly)) = (x.last(), y.last()) {
                let gap = (p.x - lx).hypot(p.y - ly);
                if gap < MIN_SAMPLE_GAP {
                    continue;
                }
            }
            x.push(p.x);
            y.push(p.y);
        }
        if x.len() < 2 {
            return Err(OptimizerError::EmptyInput);
        }
        let s = chord_lengths(&x, &y);
        let x_s = Spline::from_points(&s, &x)?;
        let y_s = Spline::from_points(&s, &y)?;
        let length = s[s.len() - 1];
        self.set_spline(x_s, y_s, length)?;
        self.s = s;
        self.x = x;
        self.y = y;
        self.update_limits();
        Ok(())
    }

    /// Usable length of the curve [m]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Truncate (or restore) the usable length; clamped to the fitted range.
    pub fn set_length(&mut self, length: f64) {
        let max = self
            .x_s
            .range()
            .zip(self.y_s.range())
            .map(|((_, x1), (_, y1))| x1.min(y1))
            .unwrap_or(0.0);
        self.length = length.max(0.0).min(max);
    }

    pub fn x_at(&self, s: f64) -> f64 {
        self.x_s.eval(s)
    }

    pub fn y_at(&self, s: f64) -> f64 {
        self.y_s.eval(s)
    }

    /// Pose on the curve at arc length `s`
    pub fn pose_at(&self, s: f64) -> State {
        State::with_all(
            self.x_s.eval(s),
            self.y_s.eval(s),
            curve_heading(&self.x_s, &self.y_s, s),
            curve_curvature(&self.x_s, &self.y_s, s),
            s,
        )
    }

    /// Re-discretize the curve: `delta_s_smaller` spacing over the first
    /// `fine_length` meters, `delta_s_larger` afterwards. The curve end is
    /// always the last sample.
    pub fn build_reference_from_spline(
        &mut self,
        delta_s_smaller: f64,
        delta_s_larger: f64,
        fine_length: f64,
    ) -> OptimizerResult<()> {
        if !(self.length > 0.0) {
            return Err(OptimizerError::EmptyInput);
        }
        if !(delta_s_smaller > 0.0 && delta_s_larger > 0.0) {
            return Err(OptimizerError::InvalidParameter(
                "sample spacing must be positive".to_string(),
            ));
        }

        let mut s_list = Vec::new();
        let mut s = 0.0;
        while s < self.length {
            s_list.push(s);
            s += if s < fine_length { delta_s_smaller } else { delta_s_larger };
        }
        // Avoid a sliver segment before the end point.
        let min_last_gap = 0.3 * delta_s_smaller.min(delta_s_larger);
        match s_list.last() {
            Some(&last) if s_list.len() > 1 && self.length - last < min_last_gap => {
                let n = s_list.len();
                s_list[n - 1] = self.length;
            }
            _ => s_list.push(self.length),
        }

        self.x = s_list.iter().map(|&s| self.x_s.eval(s)).collect();
        self.y = s_list.iter().map(|&s| self.y_s.eval(s)).collect();
        self.s = s_list;
        self.bounds.clear();
        self.abnormal_bounds.clear();
        self.update_limits();
        debug!("Reference path discretized into {} samples", self.s.len());
        Ok(())
    }

    /// Refresh heading and curvature of every sample from the splines.
    pub fn update_limits(&mut self) {
        let (x_s, y_s) = (&self.x_s, &self.y_s);
        self.heading = self.s.iter().map(|&s| curve_heading(x_s, y_s, s)).collect();
        self.k = self.s.iter().map(|&s| curve_curvature(x_s, y_s, s)).collect();
    }

    /// Query the map for the free lateral interval at every sample. Samples
    /// without a non-empty interval are kept and recorded as abnormal.
    pub fn update_bounds(&mut self, map: &dyn ObstacleMap, config: &Config) {
        self.bounds.clear();
        self.abnormal_bounds.clear();
        for i in 0..self.size() {
            let pose = self.sample(i);
            let (lower, upper) = map.lateral_clearance(
                &pose,
                config.bound_search_range,
                config.bound_search_resolution,
            );
            if !(lower < upper) {
                self.abnormal_bounds.push((pose, lower, upper));
            }
            self.bounds.push((lower, upper));
        }
        if !self.abnormal_bounds.is_empty() {
            warn!(
                "{} of {} reference samples have an empty corridor",
                self.abnormal_bounds.len(),
                self.size()
            );
        }
    }

    /// Sample the curve every `spacing` meters up to its usable length.
    pub fn resample(&self, spacing: f64) -> Vec<State> {
        if !(spacing > 0.0) || self.x_s.is_empty() {
            return Vec::new();
        }
        let mut states = Vec::new();
        let mut i = 0;
        loop {
            let s = i as f64 * spacing;
            if s >= self.length {
                break;
            }
            states.push(self.pose_at(s));
            i += 1;
        }
        states.push(self.pose_at(self.length));
        states
    }

    pub fn size(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    /// Sample `i` as a state
    pub fn sample(&self, i: usize) -> State {
        State::with_all(self.x[i], self.y[i], self.heading[i], self.k[i], self.s[i])
    }

    pub fn s(&self) -> &[f64] {
        &self.s
    }

    pub fn curvature(&self) -> &[f64] {
        &self.k
    }

    pub fn heading(&self) -> &[f64] {
        &self.heading
    }

    pub fn xs(&self) -> &[f64] {
        &self.x
    }

    pub fn ys(&self) -> &[f64] {
        &self.y
    }

    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    pub fn abnormal_bounds(&self) -> &[(State, f64, f64)] {
        &self.abnormal_bounds
    }

    /// Bounds of the sample nearest to arc length `s`
    pub fn bound_near(&self, s: f64) -> (f64, f64) {
        let n = self.s.len();
        if n == 0 || self.bounds.len() != n {
            return (f64::NEG_INFINITY, f64::INFINITY);
        }
        let i = self.s.partition_point(|&v| v < s);
        let nearest = if i == 0 {
            0
        } else if i >= n {
            n - 1
        } else if s - self.s[i - 1] <= self.s[i] - s {
            i - 1
        } else {
            i
        };
        self.bounds[nearest]
    }
}
