// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Shared runtime context
//!
//! Instead of process-wide globals, every subsystem receives an explicit
//! [`Context`] at construction. It carries the current configuration snapshot
//! and the shutdown-reason cell the main loop polls cooperatively.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use log::error;

use crate::config::Config;

/// Why the controller is being driven to a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Operator asked for an orderly stop.
    UserRequested,
    /// A bus exchange exhausted its retries; actuator state is unverified.
    CommFailure(String),
    /// A device kept diverging from its commanded state beyond the repair budget.
    DeviceInconsistent(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::UserRequested => write!(f, "user requested shutdown"),
            ShutdownReason::CommFailure(detail) => {
                write!(f, "unrecoverable bus communication failure: {}", detail)
            }
            ShutdownReason::DeviceInconsistent(detail) => {
                write!(f, "device state inconsistency: {}", detail)
            }
        }
    }
}

/// Lock-guarded shutdown-reason slot. The first reason raised wins; later
/// ones are logged and dropped so the original cause survives to the log.
pub struct ShutdownCell {
    reason: Mutex<Option<ShutdownReason>>,
}

impl ShutdownCell {
    pub fn new() -> Self {
        Self {
            reason: Mutex::new(None),
        }
    }

    pub fn raise(&self, reason: ShutdownReason) {
        let mut slot = self.reason.lock().unwrap();
        match slot.as_ref() {
            None => {
                error!("Shutdown requested: {}", reason);
                *slot = Some(reason);
            }
            Some(first) => {
                error!(
                    "Additional shutdown reason ignored ({}), already stopping because: {}",
                    reason, first
                );
            }
        }
    }

    pub fn get(&self) -> Option<ShutdownReason> {
        self.reason.lock().unwrap().clone()
    }

    pub fn is_set(&self) -> bool {
        self.reason.lock().unwrap().is_some()
    }
}

impl Default for ShutdownCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared environment threaded through all subsystems.
///
/// The configuration is kept behind a read lock as an `Arc` snapshot: a reload
/// swaps the whole snapshot atomically, readers copy the `Arc` once per
/// control-loop iteration and never observe a half-applied config.
pub struct Context {
    config: RwLock<Arc<Config>>,
    pub shutdown: ShutdownCell,
}

impl Context {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(Arc::new(config)),
            shutdown: ShutdownCell::new(),
        })
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<Config> {
        self.config.read().unwrap().clone()
    }

    /// Atomically replace the configuration snapshot.
    pub fn reload(&self, config: Config) {
        *self.config.write().unwrap() = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_shutdown_reason_wins() {
        let cell = ShutdownCell::new();
        assert!(!cell.is_set());
        cell.raise(ShutdownReason::CommFailure("slave 11".into()));
        cell.raise(ShutdownReason::UserRequested);
        assert_eq!(
            cell.get(),
            Some(ShutdownReason::CommFailure("slave 11".into()))
        );
    }

    #[test]
    fn reload_swaps_snapshot() {
        let ctx = Context::new(Config::default());
        let before = ctx.config();
        let mut cfg = Config::default();
        cfg.bus.master_address = 9;
        ctx.reload(cfg);
        assert_ne!(before.bus.master_address, ctx.config().bus.master_address);
    }
}
