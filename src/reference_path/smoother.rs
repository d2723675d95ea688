//! Default reference smoother
//!
//! Anchors the reference at the point closest to the vehicle, optionally
//! relaxes the interior points, and fits arc-length splines through them.

use log::debug;

use crate::common::error::{OptimizerError, OptimizerResult};
use crate::common::traits::{ObstacleMap, ReferenceSmoother};
use crate::common::types::State;
use crate::config::Config;
use crate::reference_path::ReferencePath;
use crate::utils::spline::{chord_lengths, Spline};

const MIN_POINT_GAP: f64 = 1e-6;

pub struct SplineSmoother {
    sample_spacing: f64,
    passes: usize,
    search_diagnostics: Vec<Vec<f64>>,
}

impl SplineSmoother {
    pub fn new(config: &Config) -> Self {
        Self {
            sample_spacing: config.smoother_sample_spacing,
            passes: config.smoother_passes,
            search_diagnostics: Vec::new(),
        }
    }

    /// Closest point to `start` on the polyline: `(segment index, x, y)`.
    fn project_start(&mut self, points: &[State], start: &State) -> (usize, f64, f64) {
        let mut best = (f64::INFINITY, 0, points[0].x, points[0].y);
        for (i, seg) in points.windows(2).enumerate() {
            let (dx, dy) = (seg[1].x - seg[0].x, seg[1].y - seg[0].y);
            let len2 = dx * dx + dy * dy;
            let t = if len2 > 0.0 {
                (((start.x - seg[0].x) * dx + (start.y - seg[0].y) * dy) / len2).max(0.0).min(1.0)
            } else {
                0.0
            };
            let (qx, qy) = (seg[0].x + t * dx, seg[0].y + t * dy);
            let dist = (qx - start.x).hypot(qy - start.y);
            self.search_diagnostics.push(vec![qx, qy, dist]);
            if dist < best.0 {
                best = (dist, i, qx, qy);
            }
        }
        (best.1, best.2, best.3)
    }

    /// Jacobi averaging with fixed end points.
    fn relax(&self, x: &mut Vec<f64>, y: &mut Vec<f64>) {
        let n = x.len();
        if n < 3 {
            return;
        }
        for _ in 0..self.passes {
            let (px, py) = (x.clone(), y.clone());
            for i in 1..n - 1 {
                x[i] = 0.5 * px[i] + 0.25 * (px[i - 1] + px[i + 1]);
                y[i] = 0.5 * py[i] + 0.25 * (py[i - 1] + py[i + 1]);
            }
        }
    }
}

fn dedup_points(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut rx: Vec<f64> = Vec::with_capacity(x.len());
    let mut ry: Vec<f64> = Vec::with_capacity(y.len());
    for (&px, &py) in x.iter().zip(y.iter()) {
        if let (Some(&lx), Some(&ly)) = (rx.last(), ry.last()) {
            if (px - lx).hypot(py - ly) < MIN_POINT_GAP {
                continue;
            }
        }
        rx.push(px);
        ry.push(py);
    }
    (rx, ry)
}

impl ReferenceSmoother for SplineSmoother {
    fn smooth(
        &mut self,
        points: &[State],
        start: &State,
        _map: &dyn ObstacleMap,
        reference: &mut ReferencePath,
    ) -> OptimizerResult<Vec<State>> {
        self.search_diagnostics.clear();
        if points.is_empty() {
            return Err(OptimizerError::EmptyInput);
        }
        if points.len() < 2 {
            return Err(OptimizerError::SmoothingFailed(
                "need at least two reference points".to_string(),
            ));
        }

        let (segment, qx, qy) = self.project_start(points, start);
        let mut x = vec![qx];
        let mut y = vec![qy];
        for p in &points[segment + 1..] {
            x.push(p.x);
            y.push(p.y);
        }
        let (mut x, mut y) = dedup_points(&x, &y);
        self.relax(&mut x, &mut y);
        let (x, y) = dedup_points(&x, &y);
        if x.len() < 2 {
            return Err(OptimizerError::SmoothingFailed(
                "fewer than two distinct points ahead of the vehicle".to_string(),
            ));
        }

        let s = chord_lengths(&x, &y);
        let length = s[s.len() - 1];
        let x_s = Spline::from_points(&s, &x)?;
        let y_s = Spline::from_points(&s, &y)?;
        reference.set_spline(x_s, y_s, length)?;
        debug!(
            "Reference smoothed from segment {}, {} points, length {:.2} m",
            segment,
            x.len(),
            length
        );
        Ok(reference.resample(self.sample_spacing))
    }

    fn search_diagnostics(&self) -> &[Vec<f64>] {
        &self.search_diagnostics
    }
}
