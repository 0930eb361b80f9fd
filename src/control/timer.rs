// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Cooperative countdown timer.
//!
//! Nothing here blocks; control loops poll `expired()` at their own pace.
//! An unstarted timer reports expired, which is what every call site wants:
//! relaxation guards and rate-limited logs are permissive before first use.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TimerSec {
    duration: Duration,
    started_at: Option<Instant>,
}

impl TimerSec {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: None,
        }
    }

    /// (Re)arm the countdown from now.
    pub fn reset(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn expired(&self) -> bool {
        match self.started_at {
            Some(start) => start.elapsed() >= self.duration,
            None => true,
        }
    }

    /// Seconds since the last reset, 0 if never armed.
    pub fn elapsed_secs(&self) -> u64 {
        self.started_at.map(|s| s.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn remaining(&self) -> Duration {
        match self.started_at {
            Some(start) => self.duration.saturating_sub(start.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_timer_is_expired() {
        let t = TimerSec::new(Duration::from_secs(60));
        assert!(t.expired());
        assert_eq!(t.remaining(), Duration::ZERO);
    }

    #[test]
    fn armed_timer_counts_down() {
        let mut t = TimerSec::new(Duration::from_millis(50));
        t.reset();
        assert!(!t.expired());
        std::thread::sleep(Duration::from_millis(60));
        assert!(t.expired());
    }
}
