// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Bounded sliding-window average for sensor jitter suppression.

use std::collections::VecDeque;

/// Fixed-capacity FIFO of samples whose value is the arithmetic mean.
/// The mean is computed lazily and cached until the next sample lands.
#[derive(Debug)]
pub struct Filter {
    window: VecDeque<f64>,
    capacity: usize,
    cached: Option<f64>,
}

impl Filter {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            cached: None,
        }
    }

    pub fn input_sample(&mut self, sample: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        self.cached = None;
    }

    /// Mean of the current window, `None` until the first sample.
    pub fn value(&mut self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        if self.cached.is_none() {
            let sum: f64 = self.window.iter().sum();
            self.cached = Some(sum / self.window.len() as f64);
        }
        self.cached
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.cached = None;
    }
}
