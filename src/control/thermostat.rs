// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Hysteresis thermostats.
//!
//! A thermostat owns a [`Filter`] over its sensor and derives a binary
//! demand state with a deadband around the threshold. The sample source is
//! injected at construction so the decision logic is testable without a bus.

use std::sync::Arc;

use super::filter::Filter;

/// Anything that can produce a temperature sample on demand.
pub trait SampleSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Closures work as sources; tests and the external-temperature feed use this.
impl<F> SampleSource for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn sample(&self) -> f64 {
        self()
    }
}

/// Classic deadband thermostat: on below `threshold - hysteresis`, off above
/// `threshold + hysteresis`, holds its previous state in between.
pub struct SymmetricThermostat {
    source: Arc<dyn SampleSource>,
    filter: Filter,
    threshold: f64,
    hysteresis: f64,
    on: bool,
}

impl SymmetricThermostat {
    pub fn new(
        source: Arc<dyn SampleSource>,
        threshold: f64,
        hysteresis: f64,
        filter_size: usize,
    ) -> Self {
        Self {
            source,
            filter: Filter::new(filter_size),
            threshold,
            hysteresis,
            on: false,
        }
    }

    /// Pull one sample from the real source and re-evaluate.
    pub fn update(&mut self) {
        let sample = self.source.sample();
        self.test_update(sample);
    }

    /// Evaluate against an injected sample.
    pub fn test_update(&mut self, sample: f64) {
        self.filter.input_sample(sample);
        if let Some(value) = self.filter.value() {
            if value < self.threshold - self.hysteresis {
                self.on = true;
            } else if value > self.threshold + self.hysteresis {
                self.on = false;
            }
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Filtered temperature, `None` before the first sample.
    pub fn value(&mut self) -> Option<f64> {
        self.filter.value()
    }
}

/// Deadband thermostat with independent widths below and above the
/// threshold. The hot water tank uses a wide down-hysteresis (recharge late)
/// and a narrow up-hysteresis (stop promptly).
pub struct AsymmetricThermostat {
    source: Arc<dyn SampleSource>,
    filter: Filter,
    threshold: f64,
    up_hysteresis: f64,
    down_hysteresis: f64,
    on: bool,
}

impl AsymmetricThermostat {
    pub fn new(
        source: Arc<dyn SampleSource>,
        threshold: f64,
        up_hysteresis: f64,
        down_hysteresis: f64,
        filter_size: usize,
    ) -> Self {
        Self {
            source,
            filter: Filter::new(filter_size),
            threshold,
            up_hysteresis,
            down_hysteresis,
            on: false,
        }
    }

    pub fn update(&mut self) {
        let sample = self.source.sample();
        self.test_update(sample);
    }

    pub fn test_update(&mut self, sample: f64) {
        self.filter.input_sample(sample);
        if let Some(value) = self.filter.value() {
            if value < self.threshold - self.down_hysteresis {
                self.on = true;
            } else if value > self.threshold + self.up_hysteresis {
                self.on = false;
            }
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn value(&mut self) -> Option<f64> {
        self.filter.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(v: f64) -> Arc<dyn SampleSource> {
        Arc::new(move || v)
    }

    #[test]
    fn symmetric_deadband_holds_state() {
        let mut t = SymmetricThermostat::new(constant(0.0), 20.0, 0.3, 1);
        t.test_update(19.0);
        assert!(t.is_on()); // 19.0 < 20.0 - 0.3
        t.test_update(20.0); // inside the deadband: hold
        assert!(t.is_on());
        t.test_update(20.5);
        assert!(!t.is_on()); // 20.5 > 20.0 + 0.3
        t.test_update(19.9); // inside again: hold off
        assert!(!t.is_on());
    }

    #[test]
    fn asymmetric_widths_differ() {
        let mut t = AsymmetricThermostat::new(constant(0.0), 50.0, 0.5, 3.0, 1);
        t.test_update(48.0); // above 50 - 3: not yet on
        assert!(!t.is_on());
        t.test_update(46.9);
        assert!(t.is_on());
        t.test_update(50.4); // below 50 + 0.5: still on
        assert!(t.is_on());
        t.test_update(50.6);
        assert!(!t.is_on());
    }

    #[test]
    fn update_pulls_from_source() {
        let mut t = SymmetricThermostat::new(constant(10.0), 20.0, 0.3, 2);
        t.update();
        assert!(t.is_on());
        assert_eq!(t.value(), Some(10.0));
    }
}
