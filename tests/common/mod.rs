// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Shared scripted slave for the integration tests.
//!
//! Emulates the slave side of the field bus behind the [`BusPort`] trait:
//! the writer half parses every request frame, applies it to an in-memory
//! register map and queues a well-formed reply that the reader half then
//! feeds back to the bus receiver.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use boiler_controller::buscomm::constants::*;
use boiler_controller::buscomm::{build_frame, BusPort, BusTiming, Buscomm};

#[derive(Default)]
pub struct FakeSlaveState {
    pub registers: HashMap<(u8, u8), u8>,
    pub writes: Vec<(u8, u8, u8)>,
    pub reads: usize,
    /// Corrupt the CRC of the next `n` replies.
    pub corrupt_next: usize,
    wire: VecDeque<u8>,
}

impl FakeSlaveState {
    pub fn set_temperature(&mut self, slave: u8, register: u8, celsius: f64) {
        self.registers
            .insert((slave, register), (celsius * 16.0) as u8);
    }
}

pub struct WriterHalf {
    state: Arc<Mutex<FakeSlaveState>>,
}

pub struct ReaderHalf {
    state: Arc<Mutex<FakeSlaveState>>,
}

impl BusPort for WriterHalf {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut st = self.state.lock().unwrap();
        let start = frame.iter().position(|&b| b != TRAIN_CHR).unwrap();
        let body = &frame[start..frame.len() - 1];
        let (master, slave, seq, opcode) = (body[1], body[2], body[3], body[4]);
        let param = &body[5..body.len() - 2];

        let mut reply = match opcode {
            SET_REGISTER => {
                st.writes.push((slave, param[0], param[1]));
                st.registers.insert((slave, param[0]), param[1]);
                build_frame(slave, master, seq, COMMAND_SUCCESS, &[])
            }
            READ_REGISTER => {
                st.reads += 1;
                let value = st.registers.get(&(slave, param[0])).copied().unwrap_or(0);
                build_frame(slave, master, seq, COMMAND_SUCCESS, &[value, 0])
            }
            PING => build_frame(slave, master, seq, ECHO, &[]),
            _ => build_frame(slave, master, seq, COMMAND_FAIL, &[]),
        };
        if st.corrupt_next > 0 {
            st.corrupt_next -= 1;
            // Flip a bit inside the CRC field (second to last wire byte is
            // CRC_LO, the last is the trailing sentinel).
            let n = reply.len();
            reply[n - 2] ^= 0x01;
        }
        st.wire.extend(reply);
        Ok(())
    }

    fn read_bytes(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl BusPort for ReaderHalf {
    fn write_frame(&mut self, _frame: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut st = self.state.lock().unwrap();
        let mut n = 0;
        while n < buf.len() {
            match st.wire.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        drop(st);
        if n == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(n)
    }
}

/// A bus handle wired to the fake slave, plus the shared slave state.
pub fn scripted_bus(master: u8) -> (Arc<Buscomm>, Arc<Mutex<FakeSlaveState>>) {
    let state = Arc::new(Mutex::new(FakeSlaveState::default()));
    let bus = Buscomm::new(
        Box::new(WriterHalf {
            state: state.clone(),
        }),
        Box::new(ReaderHalf {
            state: state.clone(),
        }),
        master,
        BusTiming {
            response_timeout: Duration::from_millis(100),
            retry_delay: Duration::from_millis(1),
        },
    );
    (bus, state)
}
