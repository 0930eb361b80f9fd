// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Byte-level receiver state machine.
//!
//! A dedicated reader thread pushes raw serial bytes into a [`ByteQueue`];
//! [`wait_for_response`] polls that queue without ever blocking on the port,
//! so the wall-clock deadline fires even when the line goes completely quiet
//! mid-frame.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use super::constants::*;
use super::crc;
use super::frame::{Response, ResponseKind};

/// Bounded FIFO between the serial reader thread and the receiver.
/// The oldest byte is dropped on overflow; a stale half-frame is worthless
/// anyway once its exchange has timed out.
pub struct ByteQueue {
    inner: Mutex<VecDeque<u8>>,
    capacity: usize,
}

impl ByteQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, byte: u8) {
        let mut q = self.inner.lock().unwrap();
        if q.len() == self.capacity {
            q.pop_front();
        }
        q.push_back(byte);
    }

    pub fn push_slice(&self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    pub fn pop(&self) -> Option<u8> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Drop everything queued; called before each send so a late straggler
    /// from the previous exchange cannot be mistaken for the new reply.
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    WaitingForTrain,
    ReceivingTrain,
    InSync,
    ReceivingMessage,
}

/// Run the receiver against `queue` until a terminal condition or `deadline`.
///
/// Exactly one [`Response`] is produced per call. The deadline is checked on
/// every poll iteration independent of byte arrival.
pub fn wait_for_response(queue: &ByteQueue, deadline: Instant) -> Response {
    let mut state = RxState::WaitingForTrain;
    let mut train_count = 0usize;
    let mut message: Vec<u8> = Vec::with_capacity(MAX_MESSAGE_LENGTH as usize);
    let mut expected_len = 0usize;

    loop {
        if Instant::now() >= deadline {
            return match state {
                RxState::WaitingForTrain | RxState::ReceivingTrain => {
                    Response::new(ResponseKind::NoTrainReceived)
                }
                _ => Response::new(ResponseKind::MessagingTimeout),
            };
        }

        let byte = match queue.pop() {
            Some(b) => b,
            None => {
                thread::sleep(RECEIVER_POLL);
                continue;
            }
        };

        match state {
            RxState::WaitingForTrain => {
                if byte == TRAIN_CHR {
                    train_count = 1;
                    state = RxState::ReceivingTrain;
                }
            }
            RxState::ReceivingTrain => {
                if byte == TRAIN_CHR {
                    train_count += 1;
                    if train_count >= TRAIN_LENGTH_RCV {
                        state = RxState::InSync;
                    }
                } else {
                    // False start: noise that looked like a train.
                    train_count = 0;
                    state = RxState::WaitingForTrain;
                }
            }
            RxState::InSync => {
                if byte == TRAIN_CHR {
                    continue;
                }
                // First payload byte is the length byte.
                if byte < MIN_MESSAGE_LENGTH || byte > MAX_MESSAGE_LENGTH {
                    return Response::with_content(ResponseKind::IllFormedMessage, vec![byte]);
                }
                expected_len = byte as usize;
                message.push(byte);
                state = RxState::ReceivingMessage;
            }
            RxState::ReceivingMessage => {
                message.push(byte);
                if message.len() == expected_len {
                    return finish_message(message);
                }
            }
        }
    }
}

fn finish_message(message: Vec<u8>) -> Response {
    let body = &message[..message.len() - 2];
    let received_crc = ((message[message.len() - 2] as u16) << 8)
        | message[message.len() - 1] as u16;
    if !crc::check(body, received_crc) {
        return Response::with_content(ResponseKind::CrcError, message);
    }

    let code = message[4];
    match code {
        COMMAND_SUCCESS | ECHO | MASTER_ECHO => {
            Response::with_content(ResponseKind::NoError, message)
        }
        CRC_ERROR => {
            // The slave itself saw garbage; same recovery path as a local
            // CRC failure.
            Response::with_content(ResponseKind::CrcError, message)
        }
        code if code <= MAX_RESPONSE_CODE => Response::device_error(message, code),
        _ => Response::with_content(ResponseKind::IllFormedMessage, message),
    }
}
