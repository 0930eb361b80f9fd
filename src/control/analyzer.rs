// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Temperature trend estimation over a time window.

use std::collections::VecDeque;
use std::time::Instant;

/// Least-squares slope of `y` over `x`. Returns 0 for degenerate inputs.
pub fn linear_slope(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x: f64 = xs[..n].iter().sum::<f64>() / nf;
    let mean_y: f64 = ys[..n].iter().sum::<f64>() / nf;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        num += dx * (ys[i] - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Timestamps are re-based once the window start grows past this, keeping
/// the regression numerically sane over months of uptime.
const REBASE_LIMIT_SECS: f64 = 86_400.0;

/// Minimum samples before `slope`/`stable` mean anything.
const MIN_SAMPLES: usize = 6;

/// Rolling `(timestamp, value)` window with a least-squares slope and a
/// stability heuristic.
#[derive(Debug)]
pub struct TempAnalyzer {
    window: VecDeque<(f64, f64)>,
    span_secs: f64,
    epoch: Instant,
    rebase_offset: f64,
    slope: f64,
}

impl TempAnalyzer {
    /// `span_secs` is how much history the window retains.
    pub fn new(span_secs: f64) -> Self {
        Self {
            window: VecDeque::new(),
            span_secs,
            epoch: Instant::now(),
            rebase_offset: 0.0,
            slope: 0.0,
        }
    }

    /// Record a sample stamped with the current time.
    pub fn update(&mut self, value: f64) {
        let t = self.epoch.elapsed().as_secs_f64();
        self.update_at(t, value);
    }

    /// Record a sample with an explicit monotonically increasing timestamp
    /// in seconds. Exposed for tests and replay.
    pub fn update_at(&mut self, t_secs: f64, value: f64) {
        // Internal storage runs on a re-based axis.
        let t_secs = t_secs - self.rebase_offset;
        self.window.push_back((t_secs, value));
        let horizon = t_secs - self.span_secs;
        while let Some(&(t0, _)) = self.window.front() {
            if t0 < horizon && self.window.len() > 2 {
                self.window.pop_front();
            } else {
                break;
            }
        }
        if let Some(&(t0, _)) = self.window.front() {
            if t0 > REBASE_LIMIT_SECS {
                self.rebase(t0);
            }
        }
        self.recompute_slope();
    }

    fn rebase(&mut self, t0: f64) {
        for entry in self.window.iter_mut() {
            entry.0 -= t0;
        }
        self.rebase_offset += t0;
    }

    fn recompute_slope(&mut self) {
        let xs: Vec<f64> = self.window.iter().map(|&(t, _)| t).collect();
        let ys: Vec<f64> = self.window.iter().map(|&(_, v)| v).collect();
        self.slope = linear_slope(&xs, &ys);
    }

    /// Trend in value units per second.
    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Heuristic: the signal counts as stable when consecutive deltas mostly
    /// agree in sign (monotone drift) or the recent tail barely moves.
    pub fn stable(&self) -> bool {
        if self.window.len() < MIN_SAMPLES {
            return false;
        }
        let values: Vec<f64> = self.window.iter().map(|&(_, v)| v).collect();

        let mut up = 0usize;
        let mut down = 0usize;
        for pair in values.windows(2) {
            let d = pair[1] - pair[0];
            if d > 0.0 {
                up += 1;
            } else if d < 0.0 {
                down += 1;
            }
        }
        let swings = up.min(down);
        let homogeneous = swings * 5 <= up + down; // at most 20% direction flips

        let tail = &values[values.len().saturating_sub(5)..];
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        let var = tail.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / tail.len() as f64;
        let quiet_tail = var.sqrt() < 0.1;

        homogeneous || quiet_tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slope_of_line_is_recovered() {
        let xs: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x + 1.0).collect();
        assert!((linear_slope(&xs, &ys) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn analyzer_tracks_rising_trend() {
        let mut a = TempAnalyzer::new(600.0);
        for i in 0..20 {
            a.update_at(i as f64 * 10.0, 20.0 + i as f64 * 0.1);
        }
        assert!((a.slope() - 0.01).abs() < 1e-6);
        assert!(a.stable());
    }

    #[test]
    fn noisy_signal_is_not_stable() {
        let mut a = TempAnalyzer::new(600.0);
        for i in 0..20 {
            let v = if i % 2 == 0 { 20.0 } else { 21.0 };
            a.update_at(i as f64 * 10.0, v);
        }
        assert!(!a.stable());
    }

    #[test]
    fn old_samples_fall_out_of_window() {
        let mut a = TempAnalyzer::new(100.0);
        for i in 0..30 {
            a.update_at(i as f64 * 10.0, 25.0);
        }
        // Window spans 100 s of the 290 s fed in.
        assert!(a.len() <= 12);
    }

    #[test]
    fn timestamps_rebase_without_changing_slope() {
        let mut a = TempAnalyzer::new(100.0);
        let mut t = REBASE_LIMIT_SECS - 50.0;
        for i in 0..30 {
            a.update_at(t, 20.0 + i as f64 * 0.05);
            t += 10.0;
        }
        // 0.05 per 10 s, preserved across the re-basing.
        assert!((a.slope() - 0.005).abs() < 1e-6);
        assert!(a.rebase_offset > 0.0);
        assert!(a.window.front().unwrap().0 < REBASE_LIMIT_SECS);
    }
}
