// Copyright (c) 2025 Gabor Szollosi
// This file is part of the boiler-controller project and is licensed under the
// MIT license (see LICENSE.md for details).

use anyhow::Result;
use boiler_controller::config::{Config, ConfiguredMode};
use tempfile::tempdir;

#[test]
fn test_config_load_and_save() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("controller.yaml");

    let mut config = Config::default();
    config.bus.port = "/dev/ttyS3".to_string();
    config.bus.baud_rate = 19200;
    config.control.hw_target = 55.0;
    config.control.mode = ConfiguredMode::Heat;

    config.save_to_file(&config_path)?;
    let loaded = Config::from_file(&config_path)?;

    assert_eq!(loaded.bus.port, "/dev/ttyS3");
    assert_eq!(loaded.bus.baud_rate, 19200);
    assert_eq!(loaded.control.hw_target, 55.0);
    assert_eq!(loaded.control.mode, ConfiguredMode::Heat);
    // Sections not touched keep their defaults through the round trip.
    assert_eq!(
        loaded.devices.switches.heater_relay.name,
        config.devices.switches.heater_relay.name
    );

    Ok(())
}

#[test]
fn test_missing_config_writes_sample() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("does_not_exist.yaml");

    // First load refuses but leaves a complete sample behind.
    assert!(Config::from_file(&config_path).is_err());
    assert!(config_path.exists());

    // The sample itself is loadable and carries the defaults.
    let sample = Config::from_file(&config_path)?;
    assert_eq!(sample.bus.master_address, 1);
    assert!(!sample.heatpump.enabled);

    Ok(())
}

#[test]
fn test_validation_rejects_broken_tables() {
    let mut config = Config::default();
    config.devices.wipers.heat.curve = vec![[50.0, 130.0]];
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.devices.wipers.hw.curve = vec![[50.0, 130.0]];
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.control.valve_exercise_hour = 24;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.control.loop_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_mode_names_in_yaml() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("controller.yaml");
    std::fs::write(&config_path, "control:\n  mode: heat_hw\n")?;
    let config = Config::from_file(&config_path)?;
    assert_eq!(config.control.mode, ConfiguredMode::HeatHw);
    Ok(())
}
