// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! RS-485 field bus protocol engine
//!
//! The installation's sensors and actuators sit on a custom half-duplex
//! serial bus. This module owns the wire format and the exchange discipline:
//!
//! - framing with a `0xFF` training preamble, length byte and CRC16-CCITT
//! - a byte-level receiver state machine fed from a bounded byte queue
//! - synchronized request/response with exactly one exchange in flight
//! - bounded retry with increasing backoff, escalating to a typed error
//!   that callers treat as fatal
//! - per-slave keepalive PINGs while the bus is otherwise idle
//!
//! ## Key Components
//!
//! - [`Buscomm`]: the shared bus handle, one per physical adapter
//! - [`Response`]: the tagged outcome of a single exchange attempt
//! - [`wait_for_response`]: the receiver state machine, testable in isolation
//!   against a scripted [`ByteQueue`]

pub mod bus;
pub mod constants;
pub mod crc;
pub mod frame;
pub mod receiver;

pub use bus::{BusError, BusPort, BusStats, BusTiming, Buscomm};
pub use frame::{build_frame, Response, ResponseKind};
pub use receiver::{wait_for_response, ByteQueue};
