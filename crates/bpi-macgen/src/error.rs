//! Error types for MAC generation

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while generating addresses
#[derive(Error, Debug)]
pub enum MacError {
    /// The serial number file could not be opened or read
    #[error("Cannot read serial number file {path}: {source}")]
    SerialUnreadable {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The serial number file has an empty first line
    #[error("Serial number file {0} is empty")]
    EmptySerial(PathBuf),

    /// An output file could not be written
    #[error("Cannot write {path}: {source}")]
    Write {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
