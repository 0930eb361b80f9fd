// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! CRC16-CCITT over bit-reversed input bytes.
//!
//! The slave firmware shifts bytes onto the line LSB first, so its CRC unit
//! sees every byte mirrored. We reverse each input byte before feeding the
//! conventional MSB-first CCITT register (poly 0x1021, init 0xFFFF) to match.

const POLY: u16 = 0x1021;
const INIT: u16 = 0xffff;

/// CRC16 of `data` as transmitted on the wire (big endian in the frame).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = INIT;
    for &byte in data {
        crc ^= (byte.reverse_bits() as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Verify `data` against a received CRC value.
pub fn check(data: &[u8], expected: u16) -> bool {
    crc16(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_roundtrip() {
        let samples: [&[u8]; 4] = [b"", b"\x00", b"123456789", b"\xff\x00\xaa\x55"];
        for data in samples {
            let crc = crc16(data);
            assert_eq!(crc, crc16(data));
            assert!(check(data, crc));
        }
    }

    #[test]
    fn single_bit_errors_are_detected() {
        let data = [0x08u8, 0x01, 0x0b, 0x42, 0x00, 0x01];
        let crc = crc16(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut corrupted = data;
                corrupted[byte] ^= 1 << bit;
                assert!(
                    !check(&corrupted, crc),
                    "flip of byte {} bit {} went undetected",
                    byte,
                    bit
                );
            }
        }
        // Flipping a bit of the CRC itself must fail verification too.
        for bit in 0..16 {
            assert!(!check(&data, crc ^ (1 << bit)));
        }
    }
}
