//! Address file and assignment flag

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::MacError;
use crate::mac::Assignment;

/// Serial number written at provisioning time
pub const DEFAULT_SERIAL_FILE: &str = "/nvram/serial_number.txt";
/// Generated addresses, one `<name> <mac>` line per interface
pub const DEFAULT_MAC_FILE: &str = "/nvram/mac_addresses.txt";
/// Present once addresses have been assigned
pub const DEFAULT_FLAG_FILE: &str = "/nvram/mac_assigned";

/// Local time format used in both files
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time in [`TIMESTAMP_FORMAT`]
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Contents of the address file
pub fn render_mac_file(assignments: &[Assignment], timestamp: &str) -> String {
    let mut out = format!("# MAC addresses generated on: {timestamp}\n");
    for assignment in assignments {
        out.push_str(&format!("{} {}\n", assignment.interface.name, assignment.mac));
    }
    out
}

/// Where generated addresses and the assignment flag live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacStore {
    /// Address file
    pub mac_file: PathBuf,
    /// Assignment flag file
    pub flag_file: PathBuf,
}

impl Default for MacStore {
    fn default() -> Self {
        Self {
            mac_file: PathBuf::from(DEFAULT_MAC_FILE),
            flag_file: PathBuf::from(DEFAULT_FLAG_FILE),
        }
    }
}

impl MacStore {
    /// Whether the flag file exists
    pub fn is_assigned(&self) -> bool {
        self.flag_file.is_file()
    }

    /// Replace the address file.
    pub fn write_addresses(
        &self,
        assignments: &[Assignment],
        timestamp: &str,
    ) -> Result<(), MacError> {
        write_file(&self.mac_file, &render_mac_file(assignments, timestamp))?;
        debug!(
            path = %self.mac_file.display(),
            count = assignments.len(),
            "address file written"
        );
        Ok(())
    }

    /// Create the flag file.
    pub fn mark_assigned(&self, timestamp: &str) -> Result<(), MacError> {
        write_file(
            &self.flag_file,
            &format!("MAC addresses assigned on: {timestamp}\n"),
        )
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), MacError> {
    std::fs::write(path, contents).map_err(|source| MacError::Write {
        path: path.to_path_buf(),
        source,
    })
}
