//! Provisioning runs against files in a temporary directory

use std::fs;

use assert_cmd::Command;
use bpi_macgen::{MacError, MacGenConfig, MacStore, Provisioned, provision};
use predicates::prelude::*;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn config_in(dir: &TempDir, serial: &str) -> Result<MacGenConfig, Box<dyn std::error::Error>> {
    let serial_file = dir.path().join("serial_number.txt");
    fs::write(&serial_file, serial)?;
    Ok(MacGenConfig {
        serial_file,
        store: MacStore {
            mac_file: dir.path().join("mac_addresses.txt"),
            flag_file: dir.path().join("mac_assigned"),
        },
        skip_if_assigned: false,
    })
}

#[test]
fn test_provision_writes_both_files() -> TestResult {
    let dir = TempDir::new()?;
    let config = config_in(&dir, "BPIR4-0012AB34CD\n")?;

    let result = provision(&config)?;
    let Provisioned::Generated { serial, assignments } = result else {
        return Err("expected addresses to be generated".into());
    };
    assert_eq!(serial, "BPIR4-0012AB34CD");
    assert_eq!(assignments.len(), 7);

    let contents = fs::read_to_string(&config.store.mac_file)?;
    let mut lines = contents.lines();
    let header = lines.next().ok_or("empty address file")?;
    assert!(header.starts_with("# MAC addresses generated on: "));
    let body: Vec<&str> = lines.collect();
    assert_eq!(body.first(), Some(&"lan0 02:01:00:ab:34:cd"));
    assert_eq!(body.last(), Some(&"wifi2 02:02:02:ab:34:d3"));

    let flag = fs::read_to_string(&config.store.flag_file)?;
    assert!(flag.starts_with("MAC addresses assigned on: "));
    assert!(config.store.is_assigned());
    Ok(())
}

#[test]
fn test_existing_flag_is_regenerated_by_default() -> TestResult {
    let dir = TempDir::new()?;
    let config = config_in(&dir, "a1b2c3")?;
    fs::write(&config.store.flag_file, "MAC addresses assigned on: earlier\n")?;

    assert!(matches!(provision(&config)?, Provisioned::Generated { .. }));
    assert!(fs::read_to_string(&config.store.mac_file)?.contains("lan1 02:01:01:a1:b2:c4"));
    let flag = fs::read_to_string(&config.store.flag_file)?;
    assert!(!flag.contains("earlier"));
    Ok(())
}

#[test]
fn test_skip_if_assigned_leaves_existing_addresses() -> TestResult {
    let dir = TempDir::new()?;
    let mut config = config_in(&dir, "a1b2c3")?;
    fs::write(&config.store.flag_file, "MAC addresses assigned on: earlier\n")?;
    config.skip_if_assigned = true;

    assert_eq!(provision(&config)?, Provisioned::AlreadyAssigned);
    assert!(!config.store.mac_file.exists());
    Ok(())
}

#[test]
fn test_skip_if_assigned_generates_first_time() -> TestResult {
    let dir = TempDir::new()?;
    let mut config = config_in(&dir, "a1b2c3")?;
    config.skip_if_assigned = true;

    assert!(matches!(provision(&config)?, Provisioned::Generated { .. }));
    assert!(config.store.is_assigned());
    Ok(())
}

#[test]
fn test_empty_serial_writes_nothing() -> TestResult {
    let dir = TempDir::new()?;
    let config = config_in(&dir, "")?;

    assert!(matches!(provision(&config), Err(MacError::EmptySerial(_))));
    assert!(!config.store.mac_file.exists());
    assert!(!config.store.is_assigned());
    Ok(())
}

#[test]
fn test_binary_reports_addresses() -> TestResult {
    let dir = TempDir::new()?;
    let config = config_in(&dir, "00c0ffee")?;

    Command::cargo_bin("bpi-macgen")?
        .arg("--serial-file")
        .arg(&config.serial_file)
        .arg("--output")
        .arg(&config.store.mac_file)
        .arg("--flag-file")
        .arg(&config.store.flag_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Read serial number: 00c0ffee"))
        .stdout(predicate::str::contains(
            "Generated MAC address for wifi0: 02:02:00:c0:ff:f2",
        ));

    Command::cargo_bin("bpi-macgen")?
        .arg("--serial-file")
        .arg(&config.serial_file)
        .arg("--output")
        .arg(&config.store.mac_file)
        .arg("--flag-file")
        .arg(&config.store.flag_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote all MAC addresses to"));

    Command::cargo_bin("bpi-macgen")?
        .arg("--serial-file")
        .arg(&config.serial_file)
        .arg("--output")
        .arg(&config.store.mac_file)
        .arg("--flag-file")
        .arg(&config.store.flag_file)
        .arg("--skip-if-assigned")
        .assert()
        .success()
        .stdout(predicate::str::contains("already been assigned"));
    Ok(())
}

#[test]
fn test_binary_missing_serial_fails() -> TestResult {
    let dir = TempDir::new()?;
    Command::cargo_bin("bpi-macgen")?
        .arg("--serial-file")
        .arg(dir.path().join("missing.txt"))
        .arg("--output")
        .arg(dir.path().join("mac_addresses.txt"))
        .arg("--flag-file")
        .arg(dir.path().join("mac_assigned"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot read serial number file"));
    Ok(())
}
