// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! The shared bus handle: synchronized send/receive, retry and keepalive.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context as AnyhowContext, Result};
use log::{debug, info, warn};
use thiserror::Error;

use super::constants::*;
use super::frame::{build_frame, Response};
use super::receiver::{wait_for_response, ByteQueue};
use crate::config::BusConfig;
use crate::context::{Context, ShutdownReason};

/// One half of the physical serial adapter. The writer half and the reader
/// half are separate objects so the reader thread can own its handle; tests
/// substitute scripted fakes.
pub trait BusPort: Send {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
    /// Read whatever is available, returning 0 when nothing arrived within
    /// the port's own (short) timeout.
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl BusPort for Box<dyn serialport::SerialPort> {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        use std::io::Write;
        self.write_all(frame)?;
        self.flush()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        match self.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// Timing parameters of one exchange, derived from the baud rate table but
/// constructible directly where tests need millisecond-scale deadlines.
#[derive(Debug, Clone, Copy)]
pub struct BusTiming {
    pub response_timeout: Duration,
    pub retry_delay: Duration,
}

impl BusTiming {
    pub fn for_baud(baud: u32) -> Self {
        Self {
            response_timeout: timeout_for_baud(baud),
            retry_delay: RETRY_DELAY,
        }
    }
}

/// Exchange counters for the heartbeat log.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusStats {
    pub exchanges: u64,
    pub retries: u64,
    pub failures: u64,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error(
        "exchange with slave {slave} (opcode {opcode}) failed after {} attempts, last outcome {:?}",
        history.len(),
        history.last().map(|r| r.kind)
    )]
    RetryExhausted {
        slave: u8,
        opcode: u8,
        history: Vec<Response>,
    },
    #[error("serial port write failed: {0}")]
    Io(#[from] io::Error),
}

struct LineState {
    writer: Box<dyn BusPort>,
    sequence: u8,
}

/// Handle to the single physical RS-485 adapter.
///
/// The `line` mutex is the bus exclusivity lock: the medium is single-master
/// half-duplex, so exactly one request/response exchange may be in flight.
/// Every caller thread serializes on it for the full duration of its
/// exchange including retries.
pub struct Buscomm {
    master_address: u8,
    timing: BusTiming,
    line: Mutex<LineState>,
    queue: Arc<ByteQueue>,
    last_seen: Mutex<HashMap<u8, Instant>>,
    stats: Mutex<BusStats>,
    reader_running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Buscomm {
    /// Create a bus handle over pre-opened port halves and start the reader
    /// thread.
    pub fn new(
        writer: Box<dyn BusPort>,
        mut reader: Box<dyn BusPort>,
        master_address: u8,
        timing: BusTiming,
    ) -> Arc<Self> {
        let queue = Arc::new(ByteQueue::new(BYTE_QUEUE_CAPACITY));
        let reader_running = Arc::new(AtomicBool::new(true));

        let queue_for_reader = queue.clone();
        let running_for_reader = reader_running.clone();
        let handle = thread::Builder::new()
            .name("bus-reader".into())
            .spawn(move || {
                let mut buf = [0u8; 64];
                while running_for_reader.load(Ordering::SeqCst) {
                    match reader.read_bytes(&mut buf) {
                        Ok(0) => {}
                        Ok(n) => queue_for_reader.push_slice(&buf[..n]),
                        Err(e) => {
                            warn!("Serial read error: {}", e);
                            thread::sleep(Duration::from_millis(50));
                        }
                    }
                }
                debug!("Bus reader thread exiting");
            })
            .expect("failed to spawn bus reader thread");

        Arc::new(Self {
            master_address,
            timing,
            line: Mutex::new(LineState {
                writer,
                sequence: 0,
            }),
            queue,
            last_seen: Mutex::new(HashMap::new()),
            stats: Mutex::new(BusStats::default()),
            reader_running,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// Open the configured serial adapter and build the bus handle.
    pub fn open(cfg: &BusConfig) -> Result<Arc<Self>> {
        let port = serialport::new(&cfg.port, cfg.baud_rate)
            // Short read timeout keeps the reader thread responsive to stop
            // requests; the protocol deadline lives in the receiver.
            .timeout(Duration::from_millis(20))
            .open()
            .with_context(|| format!("failed to open serial port {}", cfg.port))?;
        let reader = port
            .try_clone()
            .context("failed to clone serial port for the reader thread")?;
        info!("Opened field bus on {} at {} baud", cfg.port, cfg.baud_rate);
        Ok(Self::new(
            Box::new(port),
            Box::new(reader),
            cfg.master_address,
            BusTiming::for_baud(cfg.baud_rate),
        ))
    }

    /// Send one request and wait for its reply, retrying on protocol errors.
    ///
    /// Each attempt gets a fresh sequence number; backoff grows linearly with
    /// the attempt count. Exhaustion returns `RetryExhausted` with the full
    /// attempt history, which callers treat as fatal.
    pub fn send_message(&self, slave: u8, opcode: u8, param: &[u8]) -> Result<Response, BusError> {
        let mut line = self.line.lock().unwrap();
        let mut history: Vec<Response> = Vec::new();

        for attempt in 0..=MESSAGING_RETRY_COUNT {
            if attempt > 0 {
                thread::sleep(self.timing.retry_delay * attempt as u32);
                self.stats.lock().unwrap().retries += 1;
            }

            let sequence = line.sequence;
            line.sequence = line.sequence.wrapping_add(1);
            let frame = build_frame(self.master_address, slave, sequence, opcode, param);

            self.queue.clear();
            line.writer.write_frame(&frame)?;
            self.stats.lock().unwrap().exchanges += 1;

            let deadline = Instant::now() + self.timing.response_timeout;
            let response = wait_for_response(&self.queue, deadline);

            if response.is_ok() {
                self.last_seen.lock().unwrap().insert(slave, Instant::now());
                return Ok(response);
            }

            warn!(
                "Bus exchange attempt {}/{} with slave {} opcode {} failed: {:?}",
                attempt + 1,
                MESSAGING_RETRY_COUNT + 1,
                slave,
                opcode,
                response.kind
            );
            history.push(response);
        }

        self.stats.lock().unwrap().failures += 1;
        Err(BusError::RetryExhausted {
            slave,
            opcode,
            history,
        })
    }

    /// Lightweight liveness probe.
    pub fn ping(&self, slave: u8) -> Result<Response, BusError> {
        self.send_message(slave, PING, &[])
    }

    pub fn stats(&self) -> BusStats {
        *self.stats.lock().unwrap()
    }

    /// Spawn the keepalive task: slaves we have talked to before get a PING
    /// whenever they have been idle longer than `idle_threshold`. A failed
    /// PING escalates exactly like any other failed send.
    pub fn spawn_keepalive(
        self: &Arc<Self>,
        ctx: Arc<Context>,
        running: Arc<AtomicBool>,
        interval: Duration,
        idle_threshold: Duration,
    ) -> JoinHandle<()> {
        let bus = self.clone();
        thread::Builder::new()
            .name("bus-keepalive".into())
            .spawn(move || {
                debug!("Keepalive task started");
                while running.load(Ordering::SeqCst) {
                    sleep_responsive(interval, &running);
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let stale: Vec<u8> = {
                        let seen = bus.last_seen.lock().unwrap();
                        seen.iter()
                            .filter(|(_, t)| t.elapsed() >= idle_threshold)
                            .map(|(&slave, _)| slave)
                            .collect()
                    };
                    for slave in stale {
                        debug!("Keepalive PING to idle slave {}", slave);
                        if let Err(e) = bus.ping(slave) {
                            ctx.shutdown
                                .raise(ShutdownReason::CommFailure(format!(
                                    "keepalive to slave {} failed: {}",
                                    slave, e
                                )));
                        }
                    }
                }
                debug!("Keepalive task exiting");
            })
            .expect("failed to spawn keepalive thread")
    }

    /// Stop the reader thread and wait for it.
    pub fn stop(&self) {
        self.reader_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Buscomm {
    fn drop(&mut self) {
        self.reader_running.store(false, Ordering::SeqCst);
    }
}

/// Sleep in short steps so a stop request is observed promptly.
pub(crate) fn sleep_responsive(total: Duration, running: &AtomicBool) {
    let step = Duration::from_millis(100);
    let mut remaining = total;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let chunk = remaining.min(step);
        thread::sleep(chunk);
        remaining = remaining.saturating_sub(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buscomm::frame::ResponseKind;

    /// Writer that accepts frames into a log; reader that never produces a
    /// byte. Together they emulate a dead slave.
    struct SilentPort {
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl BusPort for SilentPort {
        fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
            self.written.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
        fn read_bytes(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(1));
            Ok(0)
        }
    }

    fn fast_timing() -> BusTiming {
        BusTiming {
            response_timeout: Duration::from_millis(10),
            retry_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn retry_bound_is_initial_plus_retry_count() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let bus = Buscomm::new(
            Box::new(SilentPort {
                written: written.clone(),
            }),
            Box::new(SilentPort {
                written: Arc::new(Mutex::new(Vec::new())),
            }),
            1,
            fast_timing(),
        );

        let err = bus.send_message(11, READ_REGISTER, &[2]).unwrap_err();
        match err {
            BusError::RetryExhausted { history, slave, .. } => {
                assert_eq!(slave, 11);
                assert_eq!(history.len(), MESSAGING_RETRY_COUNT + 1);
                assert!(history
                    .iter()
                    .all(|r| r.kind == ResponseKind::NoTrainReceived));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(written.lock().unwrap().len(), MESSAGING_RETRY_COUNT + 1);
        bus.stop();
    }

    #[test]
    fn sequence_numbers_increment_per_attempt() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let bus = Buscomm::new(
            Box::new(SilentPort {
                written: written.clone(),
            }),
            Box::new(SilentPort {
                written: Arc::new(Mutex::new(Vec::new())),
            }),
            1,
            fast_timing(),
        );
        let _ = bus.send_message(5, PING, &[]);
        let frames = written.lock().unwrap();
        let seqs: Vec<u8> = frames.iter().map(|f| f[TRAIN_LENGTH_SND + 3]).collect();
        for pair in seqs.windows(2) {
            assert_eq!(pair[1], pair[0].wrapping_add(1));
        }
        bus.stop();
    }
}
