//! Error types for bpifwctl

use bpi_firmware_update::FirmwareUpdateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Aborted by user")]
    Aborted,

    #[error("{0} needs confirmation; pass --yes when not running on a terminal")]
    ConfirmationRequired(String),

    #[error("Boot blocks were not switched ({0}); not rebooting")]
    NotSwitched(String),
}

/// Process exit code for a failed command.
///
/// Library failures exit with the absolute value of their error code
/// (1..=9); everything else exits with 1.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    library_code(error)
        .and_then(|code| u8::try_from(code.unsigned_abs()).ok())
        .unwrap_or(1)
}

/// Negative updater error code, or `None` for failures raised by the CLI
pub fn library_code(error: &anyhow::Error) -> Option<i32> {
    error
        .downcast_ref::<FirmwareUpdateError>()
        .map(FirmwareUpdateError::code)
}

/// Short type name used in JSON error output
pub fn error_type_name(error: &anyhow::Error) -> String {
    if let Some(e) = error.downcast_ref::<FirmwareUpdateError>() {
        return format!("{:?}", e.kind());
    }
    match error.downcast_ref::<CliError>() {
        Some(CliError::Aborted) => "Aborted".to_string(),
        Some(CliError::ConfirmationRequired(_)) => "ConfirmationRequired".to_string(),
        Some(CliError::NotSwitched(_)) => "NotSwitched".to_string(),
        None => "Error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_errors_exit_with_their_code() {
        let cases = [
            (FirmwareUpdateError::invalid("x"), 1),
            (FirmwareUpdateError::FileNotFound("x".into()), 2),
            (FirmwareUpdateError::DownloadFailed("x".into()), 4),
            (
                FirmwareUpdateError::ChecksumMismatch {
                    expected: "aa".into(),
                    written: "bb".into(),
                },
                7,
            ),
            (FirmwareUpdateError::BankDetectionFailed("x".into()), 9),
        ];
        for (error, expected) in cases {
            assert_eq!(exit_code(&anyhow::Error::new(error)), expected);
        }
    }

    #[test]
    fn test_other_errors_exit_with_one() {
        assert_eq!(exit_code(&CliError::Aborted.into()), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn test_context_keeps_library_code() {
        let error = anyhow::Error::new(FirmwareUpdateError::MountFailed("x".into()))
            .context("staging area");
        assert_eq!(exit_code(&error), 3);
        assert_eq!(error_type_name(&error), "MountFailed");
    }
}
