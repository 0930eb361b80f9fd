// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

// Main entry point for the boiler controller daemon.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::{error, info};

use boiler_controller::config::Config;
use boiler_controller::context::{Context, ShutdownReason};
use boiler_controller::daemon::Daemon;

/// Residential boiler, buffer tank and floor heating controller
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long, default_value = "controller.yaml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,

    /// Override the field bus serial port
    #[arg(long)]
    port: Option<String>,

    /// Override the field bus baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.check_config {
        let config = Config::from_file(&args.config)
            .map_err(|err| anyhow::anyhow!("configuration validation failed: {:#}", err))?;
        println!("Configuration file is valid: {}", args.config.display());
        println!(
            "Field bus on {} at {} baud, {} mode",
            config.bus.port,
            config.bus.baud_rate,
            match config.control.mode {
                boiler_controller::config::ConfiguredMode::Off => "off",
                boiler_controller::config::ConfiguredMode::Heat => "heating",
                boiler_controller::config::ConfiguredMode::HeatHw => "heating + hot water",
            }
        );
        return Ok(());
    }

    let mut config = Config::from_file(&args.config)?;
    config.apply_overrides(args.port.as_deref(), args.baud);
    let ctx = Context::new(config);

    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();
    daemon.launch(ctx.clone())?;

    wait_for_stop(&ctx)?;
    if !ctx.shutdown.is_set() {
        ctx.shutdown.raise(ShutdownReason::UserRequested);
    }
    daemon.shutdown();
    daemon.join();

    match ctx.shutdown.get() {
        Some(ShutdownReason::UserRequested) | None => {
            info!("Controller stopped");
            Ok(())
        }
        Some(reason) => {
            error!("Controller stopped abnormally: {}", reason);
            Err(anyhow::anyhow!("{}", reason))
        }
    }
}

/// Block until Ctrl-C arrives or any service raises a shutdown reason.
fn wait_for_stop(ctx: &Arc<Context>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let ctx = ctx.clone();
    runtime.block_on(async move {
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Received shutdown signal, terminating daemon");
                    return Ok(());
                }
                _ = tokio::time::sleep(Duration::from_millis(500)) => {
                    if ctx.shutdown.is_set() {
                        return Ok(());
                    }
                }
            }
        }
    })
}
