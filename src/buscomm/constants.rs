// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Wire protocol constants shared by the framer and the receiver.

use std::time::Duration;

/// Sentinel byte; a run of these marks idle bus / frame start.
pub const TRAIN_CHR: u8 = 0xff;

/// Sentinel bytes transmitted ahead of every frame.
pub const TRAIN_LENGTH_SND: usize = 4;

/// Consecutive sentinels required on receive before we consider the
/// channel synchronized.
pub const TRAIN_LENGTH_RCV: usize = 3;

/// Smallest legal value of the length byte: LEN + MASTER + SLAVE + SEQ +
/// OPCODE + CRC_HI + CRC_LO with an empty parameter field.
pub const MIN_MESSAGE_LENGTH: u8 = 7;

/// Largest legal value of the length byte (8 parameter bytes).
pub const MAX_MESSAGE_LENGTH: u8 = 15;

/// Retries after the initial attempt before a send is declared failed.
pub const MESSAGING_RETRY_COUNT: usize = 4;

/// Base unit of the inter-retry backoff; attempt `n` sleeps `n` times this.
pub const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Repair attempts the consistency checker makes before declaring a device
/// unrecoverable. "At most N": the loop runs `1..=CHECK_RETRY_COUNT`.
pub const CHECK_RETRY_COUNT: u32 = 3;

/// Pause between byte-queue polls inside the receiver.
pub const RECEIVER_POLL: Duration = Duration::from_millis(2);

/// Capacity of the raw byte queue between the serial reader and the
/// receiver state machine. Oldest bytes are dropped on overflow.
pub const BYTE_QUEUE_CAPACITY: usize = 512;

// Request opcodes understood by the slaves.
pub const SET_REGISTER: u8 = 0;
pub const READ_REGISTER: u8 = 1;
pub const IDENTIFY_REGISTER: u8 = 2;
pub const RESET_DEVICE: u8 = 3;
pub const PING: u8 = 4;
pub const SET_COMM_SPEED: u8 = 5;
pub const PING_MASTER: u8 = 6;
pub const GET_DEVICE_CRC_ERROR_COUNTER: u8 = 7;

// Response codes carried in the opcode field of a reply frame.
pub const CRC_ERROR: u8 = 0;
pub const COMMAND_SUCCESS: u8 = 1;
pub const COMMAND_FAIL: u8 = 2;
pub const ECHO: u8 = 3;
pub const TIMEOUT: u8 = 4;
pub const MASTER_ECHO: u8 = 5;

/// Highest response code a conforming slave may emit.
pub const MAX_RESPONSE_CODE: u8 = MASTER_ECHO;

/// Response deadline per configured baud rate.
///
/// The slaves bit-bang the line, so turnaround scales with the symbol time;
/// the table is enumerated rather than derived because the slowest rates
/// also carry fixed firmware overhead that a formula would miss.
pub const MESSAGING_TIMEOUTS: [(u32, u64); 18] = [
    (300, 2500),
    (600, 1500),
    (1200, 900),
    (1800, 700),
    (2400, 600),
    (3600, 500),
    (4800, 400),
    (7200, 350),
    (9600, 300),
    (14400, 250),
    (19200, 200),
    (28800, 180),
    (38400, 160),
    (56000, 150),
    (57600, 150),
    (76800, 130),
    (112500, 120),
    (115200, 100),
];

/// Response timeout for a baud rate; unknown rates fall back to the most
/// conservative entry.
pub fn timeout_for_baud(baud: u32) -> Duration {
    for (rate, ms) in MESSAGING_TIMEOUTS {
        if rate == baud {
            return Duration::from_millis(ms);
        }
    }
    Duration::from_millis(MESSAGING_TIMEOUTS[0].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_table_scales_inversely_with_baud() {
        let mut last = u64::MAX;
        for (_, ms) in MESSAGING_TIMEOUTS {
            assert!(ms <= last);
            last = ms;
        }
        assert_eq!(timeout_for_baud(9600), Duration::from_millis(300));
        // Unknown rate degrades to the slowest entry.
        assert_eq!(timeout_for_baud(1234), Duration::from_millis(2500));
    }
}
