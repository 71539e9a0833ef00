//! A/B bank firmware updates for BPI boards
//!
//! This crate writes a new firmware image to the inactive (passive) bank of
//! a dual-bank eMMC layout and, once the written kernel has been verified,
//! switches the boot blocks so the next boot comes up on the new bank:
//! - Staging area formatting and mounting
//! - Image download (HTTP(S) or local file) and bzip2 decompression
//! - Active bank detection from the kernel command line
//! - Native MBR/GPT partition table inspection of WIC images
//! - Mirroring the kernel and root filesystem onto the passive bank
//! - SHA-256 verification of the written kernel
//! - BL2/FIP boot block switch with backups
//!
//! # Architecture
//!
//! - [`updater`]: The [`FirmwareUpdater`] context and the update pipeline
//! - [`staging`], [`fetch`], [`writer`], [`verify`], [`boot_switch`]: Pipeline stages
//! - [`bank`]: Bank layout and detection
//! - [`wic`]: Partition table reader
//! - [`platform`]: OS boundary ([`Platform`] trait and its Linux implementation)
//! - [`mounts`]: Scoped mount tracking
//! - [`config`]: Configuration and progress types
//! - [`error`]: Error types
//!
//! # Safety
//!
//! The boot switch only runs after the kernel on the passive bank has been
//! read back and matched against the image. A mismatch leaves the boot
//! blocks untouched.
//!
//! # Example
//!
//! ```no_run
//! use bpi_firmware_update::prelude::*;
//!
//! # async fn example() -> Result<(), FirmwareUpdateError> {
//! let mut updater = FirmwareUpdater::linux();
//! updater.init(Some(UpdateConfig::default().with_progress(|p| {
//!     println!("[{}] {}% {}", p.stage, p.percent, p.message);
//! })))?;
//!
//! let report = updater
//!     .update_firmware("https://updates.example.net/bpi/firmware.bin.wic.bz2")
//!     .await;
//! updater.cleanup().await;
//!
//! let report = report?;
//! if report.boot_switch == BootSwitchState::Mirrored {
//!     updater.reboot_system().await?;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bank;
pub mod boot_switch;
pub mod config;
pub mod error;
pub mod fetch;
pub mod mounts;
pub mod platform;
pub mod prelude;
pub mod staging;
pub mod updater;
pub mod verify;
pub mod wic;
pub mod writer;

pub use bank::{Bank, BankInfo, detect_active_bank};
pub use boot_switch::{BootSwitchState, copy_blocks};
pub use config::{
    BankFallback, BootBlocks, ProgressCallback, ProgressStage, ScratchMounts, UpdateConfig,
    UpdateProgress,
};
pub use error::{ErrorKind, FirmwareUpdateError, error_string, result_code};
pub use fetch::FirmwareSource;
pub use mounts::MountScope;
pub use platform::{BlockMount, CommandError, ExecOptions, Filesystem, Platform, SystemCommand};
pub use updater::{FirmwareUpdater, UpdateReport, Verification};
pub use verify::compute_file_hash;
pub use wic::{PartitionEntry, get_wic_partition_offset, read_partition_table};

#[cfg(target_os = "linux")]
pub use platform::LinuxPlatform;
