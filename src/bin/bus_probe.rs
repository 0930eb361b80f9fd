// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

//! Field bus probe for commissioning and troubleshooting.
//!
//! Talks to a single slave without starting the controller: ping it, read
//! its identification, dump a register or fetch the device-side CRC error
//! counter.

use clap::{Parser, Subcommand};
use std::error::Error;

use boiler_controller::buscomm::constants::{
    GET_DEVICE_CRC_ERROR_COUNTER, IDENTIFY_REGISTER, READ_REGISTER,
};
use boiler_controller::buscomm::{BusTiming, Buscomm};
use boiler_controller::config::BusConfig;

/// Probe a single slave on the RS-485 field bus
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Serial device of the RS-485 adapter
    #[clap(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Line speed in baud
    #[clap(long, default_value = "9600")]
    baud: u32,

    /// Our own (master) bus address
    #[clap(long, default_value = "1")]
    master: u8,

    /// Slave address to probe
    #[clap(long)]
    slave: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Liveness check
    Ping,
    /// Read the device identification bytes
    Identify,
    /// Read one register
    Read {
        /// Register address on the slave
        #[clap(long)]
        register: u8,
    },
    /// Read the slave's CRC error counter
    CrcErrors,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let config = BusConfig {
        port: args.port.clone(),
        baud_rate: args.baud,
        master_address: args.master,
        ..BusConfig::default()
    };
    println!("Opening {} at {} baud", config.port, config.baud_rate);
    let bus = Buscomm::open(&config)?;
    let timing = BusTiming::for_baud(args.baud);
    println!(
        "Response timeout for this baud rate: {} ms",
        timing.response_timeout.as_millis()
    );

    match args.command {
        Command::Ping => {
            let response = bus.ping(args.slave)?;
            println!("Slave {} answered: {:?}", args.slave, response.kind);
        }
        Command::Identify => {
            let response = bus.send_message(args.slave, IDENTIFY_REGISTER, &[])?;
            println!("Identification: {:02x?}", response.payload());
        }
        Command::Read { register } => {
            let response = bus.send_message(args.slave, READ_REGISTER, &[register])?;
            let payload = response.payload();
            println!("Register {} raw bytes: {:02x?}", register, payload);
            if payload.len() >= 2 {
                let value = i16::from_le_bytes([payload[0], payload[1]]);
                println!(
                    "As temperature: {:.2} °C (raw {})",
                    value as f64 / 16.0,
                    value
                );
            }
        }
        Command::CrcErrors => {
            let response = bus.send_message(args.slave, GET_DEVICE_CRC_ERROR_COUNTER, &[])?;
            let payload = response.payload();
            if payload.len() >= 2 {
                let count = u16::from_le_bytes([payload[0], payload[1]]);
                println!("Slave {} CRC error counter: {}", args.slave, count);
            } else {
                println!("Unexpected payload: {:02x?}", payload);
            }
        }
    }

    bus.stop();
    Ok(())
}
