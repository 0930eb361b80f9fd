// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Piecewise-linear interpolation tables.
//!
//! Used for sensor resistance/temperature curves, the heating/floor target
//! curves and the non-linear wiper code tables.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CurveError {
    #[error("a polycurve needs at least two control points")]
    TooFewPoints,
    #[error("control point abscissas must be strictly increasing (duplicate x = {0})")]
    DuplicateAbscissa(f64),
}

/// Sorted `(x, y)` control points with linear interpolation between them.
#[derive(Debug, Clone)]
pub struct Polycurve {
    points: Vec<(f64, f64)>,
}

impl Polycurve {
    /// Points may arrive in any order; duplicates on `x` are rejected.
    pub fn new(mut points: Vec<(f64, f64)>) -> Result<Self, CurveError> {
        if points.len() < 2 {
            return Err(CurveError::TooFewPoints);
        }
        points.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("NaN control point"));
        for pair in points.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(CurveError::DuplicateAbscissa(pair[0].0));
            }
        }
        Ok(Self { points })
    }

    /// Interpolated value with out-of-range inputs clamped to the endpoints.
    pub fn value(&self, x: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        self.interpolate(x)
    }

    /// Interpolated value with linear extrapolation beyond the endpoints.
    pub fn value_unconstrained(&self, x: f64) -> f64 {
        self.interpolate(x)
    }

    fn interpolate(&self, x: f64) -> f64 {
        let (p0, p1) = self.bracketing_segment(x);
        let t = (x - p0.0) / (p1.0 - p0.0);
        p0.1 + t * (p1.1 - p0.1)
    }

    /// Segment containing `x`, or the nearest end segment for extrapolation.
    fn bracketing_segment(&self, x: f64) -> ((f64, f64), (f64, f64)) {
        let n = self.points.len();
        for i in 0..n - 1 {
            if x <= self.points[i + 1].0 {
                return (self.points[i], self.points[i + 1]);
            }
        }
        (self.points[n - 2], self.points[n - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_tables() {
        assert_eq!(
            Polycurve::new(vec![(0.0, 0.0)]).unwrap_err(),
            CurveError::TooFewPoints
        );
        assert_eq!(
            Polycurve::new(vec![(1.0, 0.0), (1.0, 5.0)]).unwrap_err(),
            CurveError::DuplicateAbscissa(1.0)
        );
    }

    #[test]
    fn interpolates_within_range() {
        let curve = Polycurve::new(vec![(0.0, 0.0), (10.0, 100.0)]).unwrap();
        assert_eq!(curve.value(5.0), 50.0);
        assert_eq!(curve.value(0.0), 0.0);
        assert_eq!(curve.value(10.0), 100.0);
    }

    #[test]
    fn clamps_by_default_extrapolates_on_request() {
        let curve = Polycurve::new(vec![(0.0, 0.0), (10.0, 100.0)]).unwrap();
        assert_eq!(curve.value(-5.0), 0.0);
        assert_eq!(curve.value(15.0), 100.0);
        assert_eq!(curve.value_unconstrained(-5.0), -50.0);
        assert_eq!(curve.value_unconstrained(15.0), 150.0);
    }

    #[test]
    fn accepts_unsorted_input() {
        let curve = Polycurve::new(vec![(10.0, 40.0), (-10.0, 70.0), (0.0, 55.0)]).unwrap();
        assert_eq!(curve.value(-5.0), 62.5);
    }
}
