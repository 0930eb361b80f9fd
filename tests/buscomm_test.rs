// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! End-to-end exchanges against a scripted slave.

mod common;

use boiler_controller::buscomm::constants::{COMMAND_SUCCESS, READ_REGISTER, SET_REGISTER};
use boiler_controller::buscomm::ResponseKind;
use common::scripted_bus;

#[test]
fn test_read_register_roundtrip() {
    let (bus, slave) = scripted_bus(1);
    slave.lock().unwrap().registers.insert((11, 2), 42);

    let response = bus.send_message(11, READ_REGISTER, &[2]).unwrap();
    assert_eq!(response.kind, ResponseKind::NoError);
    assert_eq!(response.response_code(), Some(COMMAND_SUCCESS));
    assert_eq!(response.from_address(), Some(11));
    assert_eq!(response.payload(), &[42, 0]);

    bus.stop();
}

#[test]
fn test_write_then_read_back() {
    let (bus, slave) = scripted_bus(1);

    bus.send_message(11, SET_REGISTER, &[3, 1]).unwrap();
    let response = bus.send_message(11, READ_REGISTER, &[3]).unwrap();
    assert_eq!(response.payload()[0], 1);
    assert_eq!(slave.lock().unwrap().writes, vec![(11, 3, 1)]);

    bus.stop();
}

#[test]
fn test_corrupted_reply_is_retried_transparently() {
    let (bus, slave) = scripted_bus(1);
    {
        let mut st = slave.lock().unwrap();
        st.registers.insert((11, 0), 7);
        st.corrupt_next = 2;
    }

    // Two bad CRCs, then a clean reply; the caller only sees success.
    let response = bus.send_message(11, READ_REGISTER, &[0]).unwrap();
    assert_eq!(response.payload()[0], 7);

    let stats = bus.stats();
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.exchanges, 3);

    bus.stop();
}

#[test]
fn test_ping_answers_echo() {
    let (bus, _slave) = scripted_bus(1);
    let response = bus.ping(21).unwrap();
    assert_eq!(response.kind, ResponseKind::NoError);
    bus.stop();
}
