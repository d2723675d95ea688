//! Natural cubic spline interpolant
//!
//! One-dimensional spline used for the arc-length parameterized curves
//! `x(s)` and `y(s)`. Outside the data range it extrapolates linearly.

use crate::common::error::{OptimizerError, OptimizerResult};

#[derive(Debug, Clone, Default)]
pub struct Spline {
    x: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl Spline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(x: &[f64], y: &[f64]) -> OptimizerResult<Self> {
        let mut spline = Self::new();
        spline.set_points(x, y)?;
        Ok(spline)
    }

    /// Fit the spline through `(x[i], y[i])`; `x` must be strictly increasing.
    pub fn set_points(&mut self, x: &[f64], y: &[f64]) -> OptimizerResult<()> {
        let n = x.len();
        if n != y.len() {
            return Err(OptimizerError::InvalidParameter(format!(
                "spline needs x and y of equal length, got {} and {}",
                n,
                y.len()
            )));
        }
        if n < 2 {
            return Err(OptimizerError::InvalidParameter(
                "spline needs at least 2 points".to_string(),
            ));
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(OptimizerError::NumericalError(
                "spline knots must be strictly increasing".to_string(),
            ));
        }

        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let a = y.to_vec();
        let mut b = vec![0.0; n];
        let mut c = vec![0.0; n];
        let mut d = vec![0.0; n];

        let mut alpha = vec![0.0; n];
        for i in 1..n - 1 {
            alpha[i] = 3.0 * (a[i + 1] - a[i]) / h[i] - 3.0 * (a[i] - a[i - 1]) / h[i - 1];
        }

        // Tridiagonal solve with natural end conditions.
        let mut l = vec![1.0; n];
        let mut mu = vec![0.0; n];
        let mut z = vec![0.0; n];
        for i in 1..n - 1 {
            l[i] = 2.0 * (x[i + 1] - x[i - 1]) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / l[i];
            z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
        }

        for j in (0..n - 1).rev() {
            c[j] = z[j] - mu[j] * c[j + 1];
            b[j] = (a[j + 1] - a[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
            d[j] = (c[j + 1] - c[j]) / (3.0 * h[j]);
        }
        let last = n - 2;
        b[n - 1] = b[last] + 2.0 * c[last] * h[last] + 3.0 * d[last] * h[last].powi(2);

        self.x = x.to_vec();
        self.a = a;
        self.b = b;
        self.c = c;
        self.d = d;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Knot range `(first, last)`
    pub fn range(&self) -> Option<(f64, f64)> {
        match (self.x.first(), self.x.last()) {
            (Some(&first), Some(&last)) => Some((first, last)),
            _ => None,
        }
    }

    pub fn eval(&self, t: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let n = self.x.len();
        if t < self.x[0] {
            return self.a[0] + self.b[0] * (t - self.x[0]);
        }
        if t > self.x[n - 1] {
            return self.a[n - 1] + self.b[n - 1] * (t - self.x[n - 1]);
        }
        let i = self.search_index(t);
        let dx = t - self.x[i];
        self.a[i] + self.b[i] * dx + self.c[i] * dx.powi(2) + self.d[i] * dx.powi(3)
    }

    /// Derivative of the given order (1 or 2; higher orders are 3rd-derivative
    /// constants or zero).
    pub fn deriv(&self, order: u32, t: f64) -> f64 {
        if self.is_empty() || order == 0 {
            return self.eval(t);
        }
        let n = self.x.len();
        if t < self.x[0] || t > self.x[n - 1] {
            let edge = if t < self.x[0] { 0 } else { n - 1 };
            return if order == 1 { self.b[edge] } else { 0.0 };
        }
        let i = self.search_index(t);
        let dx = t - self.x[i];
        match order {
            1 => self.b[i] + 2.0 * self.c[i] * dx + 3.0 * self.d[i] * dx.powi(2),
            2 => 2.0 * self.c[i] + 6.0 * self.d[i] * dx,
            3 => 6.0 * self.d[i],
            _ => 0.0,
        }
    }

    fn search_index(&self, t: f64) -> usize {
        let n = self.x.len();
        let i = self.x.partition_point(|&v| v <= t);
        i.saturating_sub(1).min(n - 2)
    }
}

/// Heading of the planar curve `(x(s), y(s))`
pub fn curve_heading(x_s: &Spline, y_s: &Spline, s: f64) -> f64 {
    y_s.deriv(1, s).atan2(x_s.deriv(1, s))
}

/// Signed curvature of the planar curve `(x(s), y(s))`
pub fn curve_curvature(x_s: &Spline, y_s: &Spline, s: f64) -> f64 {
    let dx = x_s.deriv(1, s);
    let dy = y_s.deriv(1, s);
    let ddx = x_s.deriv(2, s);
    let ddy = y_s.deriv(2, s);
    let denom = (dx * dx + dy * dy).powf(1.5);
    if denom < 1e-12 {
        return 0.0;
    }
    (dx * ddy - dy * ddx) / denom
}

/// Cumulative chord length of a point sequence, starting at 0.
pub fn chord_lengths(x: &[f64], y: &[f64]) -> Vec<f64> {
    let mut s = Vec::with_capacity(x.len());
    if x.is_empty() {
        return s;
    }
    s.push(0.0);
    for i in 1..x.len() {
        let ds = ((x[i] - x[i - 1]).powi(2) + (y[i] - y[i - 1]).powi(2)).sqrt();
        s.push(s[i - 1] + ds);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spline_passes_through_points() {
        let x = vec![0.0, 1.0, 2.5, 4.0, 6.0];
        let y = vec![0.0, 2.0, -1.0, 0.5, 3.0];
        let sp = Spline::from_points(&x, &y).unwrap();
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert!((sp.eval(*xi) - yi).abs() < 1e-10);
        }
    }

    #[test]
    fn test_two_point_spline_is_linear() {
        let sp = Spline::from_points(&[0.0, 2.0], &[1.0, 5.0]).unwrap();
        assert!((sp.eval(1.0) - 3.0).abs() < 1e-12);
        assert!((sp.deriv(1, 0.5) - 2.0).abs() < 1e-12);
        assert!(sp.deriv(2, 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_linear_extrapolation() {
        let sp = Spline::from_points(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0]).unwrap();
        assert!((sp.eval(3.0) - 3.0).abs() < 1e-10);
        assert!((sp.eval(-1.0) + 1.0).abs() < 1e-10);
        assert!((sp.deriv(1, 5.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_natural_end_conditions() {
        let sp = Spline::from_points(&[0.0, 1.0, 2.0, 3.0], &[0.0, 1.0, 0.0, 1.0]).unwrap();
        assert!(sp.deriv(2, 0.0).abs() < 1e-10);
        assert!(sp.deriv(2, 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Spline::from_points(&[0.0], &[1.0]).is_err());
        assert!(Spline::from_points(&[0.0, 1.0], &[1.0]).is_err());
        assert!(Spline::from_points(&[0.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_circle_curvature() {
        let radius = 10.0;
        let n = 60;
        let xs: Vec<f64> = (0..=n).map(|i| radius * (i as f64 * 0.02).cos()).collect();
        let ys: Vec<f64> = (0..=n).map(|i| radius * (i as f64 * 0.02).sin()).collect();
        let s = chord_lengths(&xs, &ys);
        let x_s = Spline::from_points(&s, &xs).unwrap();
        let y_s = Spline::from_points(&s, &ys).unwrap();
        let mid = s[n / 2];
        assert!((curve_curvature(&x_s, &y_s, mid) - 1.0 / radius).abs() < 1e-3);
        let heading = curve_heading(&x_s, &y_s, mid);
        let expected = (n / 2) as f64 * 0.02 + std::f64::consts::FRAC_PI_2;
        assert!((heading - expected).abs() < 1e-3);
    }
}
