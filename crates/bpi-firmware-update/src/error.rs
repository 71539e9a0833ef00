//! Error types for firmware update operations
//!
//! Every public operation fails with exactly one [`ErrorKind`]. The variants of
//! [`FirmwareUpdateError`] carry a detail message for logs; callers that only
//! need the kind use [`FirmwareUpdateError::kind`] or the numeric
//! [`FirmwareUpdateError::code`].

use core::fmt;

use thiserror::Error;

/// Errors that can occur during firmware update operations
#[derive(Error, Debug)]
pub enum FirmwareUpdateError {
    /// Missing/empty argument, or the updater has not been initialised
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A required file is missing or could not be read
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Mounting a filesystem failed
    #[error("Mount operation failed: {0}")]
    MountFailed(String),

    /// Fetching the firmware image failed
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Decompressing the firmware image failed
    #[error("Decompression failed: {0}")]
    DecompressFailed(String),

    /// Formatting a partition or resolving a partition offset failed
    #[error("Partition operation failed: {0}")]
    PartitionFailed(String),

    /// The kernel written to the passive bank differs from the source image
    #[error("Checksum mismatch: expected {expected}, written {written}")]
    ChecksumMismatch {
        /// Checksum of the kernel inside the downloaded image
        expected: String,
        /// Checksum of the kernel read back from the passive partition
        written: String,
    },

    /// A system command or raw block copy failed
    #[error("System command failed: {0}")]
    SystemCommandFailed(String),

    /// The active bank could not be determined from the boot parameters
    #[error("Bank detection failed: {0}")]
    BankDetectionFailed(String),
}

impl FirmwareUpdateError {
    /// Get the error kind for classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FirmwareUpdateError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            FirmwareUpdateError::FileNotFound(_) => ErrorKind::FileNotFound,
            FirmwareUpdateError::MountFailed(_) => ErrorKind::MountFailed,
            FirmwareUpdateError::DownloadFailed(_) => ErrorKind::DownloadFailed,
            FirmwareUpdateError::DecompressFailed(_) => ErrorKind::DecompressFailed,
            FirmwareUpdateError::PartitionFailed(_) => ErrorKind::PartitionFailed,
            FirmwareUpdateError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            FirmwareUpdateError::SystemCommandFailed(_) => ErrorKind::SystemCommandFailed,
            FirmwareUpdateError::BankDetectionFailed(_) => ErrorKind::BankDetectionFailed,
        }
    }

    /// Numeric code of this error (always negative).
    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    /// Create an invalid-parameter error with a message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        FirmwareUpdateError::InvalidParameter(msg.into())
    }

    /// Create a system-command error with a message.
    pub fn system(msg: impl Into<String>) -> Self {
        FirmwareUpdateError::SystemCommandFailed(msg.into())
    }
}

/// Error kind, with the numeric codes used by existing callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// Invalid parameter
    InvalidParameter = -1,
    /// File not found
    FileNotFound = -2,
    /// Mount failed
    MountFailed = -3,
    /// Download failed
    DownloadFailed = -4,
    /// Decompression failed
    DecompressFailed = -5,
    /// Partition operation failed
    PartitionFailed = -6,
    /// Checksum mismatch
    ChecksumMismatch = -7,
    /// System command failed
    SystemCommandFailed = -8,
    /// Bank detection failed
    BankDetectionFailed = -9,
}

impl ErrorKind {
    /// All error kinds, in code order.
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::InvalidParameter,
        ErrorKind::FileNotFound,
        ErrorKind::MountFailed,
        ErrorKind::DownloadFailed,
        ErrorKind::DecompressFailed,
        ErrorKind::PartitionFailed,
        ErrorKind::ChecksumMismatch,
        ErrorKind::SystemCommandFailed,
        ErrorKind::BankDetectionFailed,
    ];

    /// Numeric code of this kind.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Look up a kind by its numeric code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Human-readable description of this kind.
    pub const fn description(self) -> &'static str {
        match self {
            ErrorKind::InvalidParameter => "Invalid parameter",
            ErrorKind::FileNotFound => "File not found",
            ErrorKind::MountFailed => "Mount operation failed",
            ErrorKind::DownloadFailed => "Download failed",
            ErrorKind::DecompressFailed => "Decompression failed",
            ErrorKind::PartitionFailed => "Partition operation failed",
            ErrorKind::ChecksumMismatch => "Kernel checksum mismatch",
            ErrorKind::SystemCommandFailed => "System command failed",
            ErrorKind::BankDetectionFailed => "Bank detection failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Human-readable string for a numeric result code.
///
/// `0` is success; unknown codes map to a fallback string.
pub fn error_string(code: i32) -> &'static str {
    if code == 0 {
        return "Success";
    }
    ErrorKind::from_code(code).map_or("Unknown error", ErrorKind::description)
}

/// Result code of an operation: `0` on success, the error code otherwise.
pub fn result_code<T>(result: &Result<T, FirmwareUpdateError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(0), None);
        assert_eq!(ErrorKind::from_code(-10), None);
    }

    #[test]
    fn test_error_strings_distinct() {
        let strings: HashSet<_> = ErrorKind::ALL.iter().map(|k| error_string(k.code())).collect();
        assert_eq!(strings.len(), ErrorKind::ALL.len());
        assert!(!strings.contains("Unknown error"));
        assert!(!strings.contains("Success"));
    }

    #[test]
    fn test_error_string_fallback() {
        assert_eq!(error_string(0), "Success");
        assert_eq!(error_string(-42), "Unknown error");
        assert_eq!(error_string(7), "Unknown error");
    }

    #[test]
    fn test_kind_of_checksum_mismatch() {
        let err = FirmwareUpdateError::ChecksumMismatch {
            expected: "aa".to_string(),
            written: "bb".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        assert_eq!(err.code(), -7);
    }

    #[test]
    fn test_result_code() {
        let ok: Result<(), FirmwareUpdateError> = Ok(());
        assert_eq!(result_code(&ok), 0);
        let err: Result<(), FirmwareUpdateError> = Err(FirmwareUpdateError::invalid("x"));
        assert_eq!(result_code(&err), -1);
    }
}
