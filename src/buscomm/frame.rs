// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Frame construction and the per-exchange [`Response`] type.
//!
//! Wire layout of one frame:
//!
//! ```text
//! FF FF FF FF | LEN | MASTER | SLAVE | SEQ | OPCODE | PARAM... | CRC_HI CRC_LO | FF
//! ```
//!
//! `LEN` counts every byte from itself through `CRC_LO` inclusive. The CRC
//! covers `LEN` through the last parameter byte.

use super::constants::*;
use super::crc;

/// Byte offsets inside the stored payload (`LEN..CRC_LO`).
const OFF_FROM: usize = 1;
const OFF_SEQ: usize = 3;
const OFF_CODE: usize = 4;
const TRAILER_LEN: usize = 2;

/// Build a complete request frame including train and trailing sentinel.
pub fn build_frame(master: u8, slave: u8, sequence: u8, opcode: u8, param: &[u8]) -> Vec<u8> {
    let len = MIN_MESSAGE_LENGTH as usize + param.len();
    debug_assert!(len <= MAX_MESSAGE_LENGTH as usize);

    let mut frame = Vec::with_capacity(TRAIN_LENGTH_SND + len + 1);
    frame.resize(TRAIN_LENGTH_SND, TRAIN_CHR);
    frame.push(len as u8);
    frame.push(master);
    frame.push(slave);
    frame.push(sequence);
    frame.push(opcode);
    frame.extend_from_slice(param);

    let crc = crc::crc16(&frame[TRAIN_LENGTH_SND..]);
    frame.push((crc >> 8) as u8);
    frame.push((crc & 0xff) as u8);
    frame.push(TRAIN_CHR);
    frame
}

/// Outcome classification of a single exchange attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    NoError,
    NoTrainReceived,
    IllFormedMessage,
    MessagingTimeout,
    CrcError,
    DeviceError,
}

/// Result of one `send_message` attempt, produced by the receiver state
/// machine and consumed immediately by the caller; never persisted beyond
/// the retry history of a failed send.
#[derive(Debug, Clone)]
pub struct Response {
    pub kind: ResponseKind,
    /// Raw payload bytes `LEN..CRC_LO`, when a frame was assembled.
    pub content: Option<Vec<u8>>,
    /// Response code reported by the device itself on `DeviceError`.
    pub device_response_code: Option<u8>,
}

impl Response {
    pub fn new(kind: ResponseKind) -> Self {
        Self {
            kind,
            content: None,
            device_response_code: None,
        }
    }

    pub fn with_content(kind: ResponseKind, content: Vec<u8>) -> Self {
        Self {
            kind,
            content: Some(content),
            device_response_code: None,
        }
    }

    pub fn device_error(content: Vec<u8>, code: u8) -> Self {
        Self {
            kind: ResponseKind::DeviceError,
            content: Some(content),
            device_response_code: Some(code),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.kind == ResponseKind::NoError
    }

    /// Sequence number echoed by the slave, if a complete frame was
    /// assembled. Ill-formed attempts may carry truncated content.
    pub fn sequence(&self) -> Option<u8> {
        self.field(OFF_SEQ)
    }

    /// Address the reply came from.
    pub fn from_address(&self) -> Option<u8> {
        self.field(OFF_FROM)
    }

    /// Response code carried in the opcode field.
    pub fn response_code(&self) -> Option<u8> {
        self.field(OFF_CODE)
    }

    fn field(&self, offset: usize) -> Option<u8> {
        match &self.content {
            Some(c) if c.len() >= MIN_MESSAGE_LENGTH as usize => c.get(offset).copied(),
            _ => None,
        }
    }

    /// Parameter bytes of the reply; empty when no frame was assembled.
    pub fn payload(&self) -> &[u8] {
        match &self.content {
            Some(c) if c.len() >= MIN_MESSAGE_LENGTH as usize => {
                &c[OFF_CODE + 1..c.len() - TRAILER_LEN]
            }
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout_and_length_byte() {
        let frame = build_frame(1, 11, 42, SET_REGISTER, &[2, 1]);
        // train + LEN..CRC_LO + trailing sentinel
        assert_eq!(frame.len(), TRAIN_LENGTH_SND + 9 + 1);
        assert!(frame[..TRAIN_LENGTH_SND].iter().all(|&b| b == TRAIN_CHR));
        assert_eq!(frame[TRAIN_LENGTH_SND], 9); // LEN counts itself..CRC_LO
        assert_eq!(frame[TRAIN_LENGTH_SND + 1], 1);
        assert_eq!(frame[TRAIN_LENGTH_SND + 2], 11);
        assert_eq!(frame[TRAIN_LENGTH_SND + 3], 42);
        assert_eq!(frame[TRAIN_LENGTH_SND + 4], SET_REGISTER);
        assert_eq!(*frame.last().unwrap(), TRAIN_CHR);
    }

    #[test]
    fn frame_crc_covers_len_through_params() {
        let frame = build_frame(1, 11, 0, READ_REGISTER, &[7]);
        let body = &frame[TRAIN_LENGTH_SND..frame.len() - 3];
        let hi = frame[frame.len() - 3];
        let lo = frame[frame.len() - 2];
        assert!(crc::check(body, ((hi as u16) << 8) | lo as u16));
    }

    #[test]
    fn payload_extraction() {
        // Simulated reply frame body: LEN FROM TO SEQ CODE PARAM CRC CRC
        let mut body = vec![8u8, 11, 1, 3, COMMAND_SUCCESS, 0x55];
        let crc = crc::crc16(&body);
        body.push((crc >> 8) as u8);
        body.push((crc & 0xff) as u8);
        let resp = Response::with_content(ResponseKind::NoError, body);
        assert_eq!(resp.payload(), &[0x55]);
        assert_eq!(resp.sequence(), Some(3));
        assert_eq!(resp.response_code(), Some(COMMAND_SUCCESS));
    }

    #[test]
    fn truncated_content_yields_no_fields() {
        // The receiver keeps whatever fragment it assembled before giving
        // up; the accessors must treat it as absent rather than index it.
        let resp = Response::with_content(ResponseKind::IllFormedMessage, vec![0x02]);
        assert_eq!(resp.sequence(), None);
        assert_eq!(resp.from_address(), None);
        assert_eq!(resp.response_code(), None);
        assert_eq!(resp.payload(), &[] as &[u8]);
    }
}
