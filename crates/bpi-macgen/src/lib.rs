//! MAC address provisioning for BPI boards
//!
//! Derives one locally administered address per network interface from the
//! last three bytes of the board serial number and records them in NVRAM:
//!
//! ```text
//! 02:<type>:<index>:<s0>:<s1>:<s2 + n>
//! ```
//!
//! where `type` is `01` for LAN ports and `02` for Wi-Fi radios, and `n` is
//! the interface's position in [`INTERFACES`].

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod mac;
pub mod serial;
pub mod store;

use std::path::PathBuf;

use tracing::info;

pub use error::MacError;
pub use mac::{
    Assignment, INTERFACES, Interface, InterfaceType, MacAddress, generate_all, generate_mac,
};
pub use serial::{extract_serial_bytes, read_serial_number};
pub use store::{DEFAULT_SERIAL_FILE, MacStore, timestamp_now};

/// Inputs and outputs of one provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacGenConfig {
    /// Serial number file
    pub serial_file: PathBuf,
    /// Output files
    pub store: MacStore,
    /// Leave existing addresses alone when the flag file exists
    pub skip_if_assigned: bool,
}

impl Default for MacGenConfig {
    fn default() -> Self {
        Self {
            serial_file: PathBuf::from(DEFAULT_SERIAL_FILE),
            store: MacStore::default(),
            skip_if_assigned: false,
        }
    }
}

/// Result of [`provision`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// The flag file exists and `skip_if_assigned` was set; nothing was written
    AlreadyAssigned,
    /// Addresses were generated and written
    Generated {
        /// Serial number the addresses derive from
        serial: String,
        /// One address per interface
        assignments: Vec<Assignment>,
    },
}

/// Generate addresses, write the address file, then set the flag.
///
/// Addresses are regenerated on every run unless `skip_if_assigned` is set
/// and the flag file already exists.
pub fn provision(config: &MacGenConfig) -> Result<Provisioned, MacError> {
    if config.skip_if_assigned && config.store.is_assigned() {
        info!(flag = %config.store.flag_file.display(), "addresses already assigned");
        return Ok(Provisioned::AlreadyAssigned);
    }

    let serial = read_serial_number(&config.serial_file)?;
    let bytes = extract_serial_bytes(&serial);
    info!(serial = %serial, "serial number read");

    let assignments = generate_all(bytes);
    let timestamp = timestamp_now();
    config.store.write_addresses(&assignments, &timestamp)?;
    config.store.mark_assigned(&timestamp)?;
    info!(
        path = %config.store.mac_file.display(),
        count = assignments.len(),
        "addresses assigned"
    );

    Ok(Provisioned::Generated {
        serial,
        assignments,
    })
}
