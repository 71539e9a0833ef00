//! Convenience re-exports for common firmware update types

pub use crate::bank::{Bank, BankInfo};
pub use crate::boot_switch::BootSwitchState;
pub use crate::config::{BankFallback, ProgressStage, UpdateConfig, UpdateProgress};
pub use crate::error::{ErrorKind, FirmwareUpdateError, error_string};
pub use crate::platform::Platform;
pub use crate::updater::{FirmwareUpdater, UpdateReport, Verification};
pub use crate::wic::get_wic_partition_offset;

#[cfg(target_os = "linux")]
pub use crate::platform::LinuxPlatform;
