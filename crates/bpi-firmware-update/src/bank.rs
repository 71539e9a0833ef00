//! A/B bank detection
//!
//! The board carries two banks, each a kernel (boot) partition plus a root
//! filesystem. The booted bank is read from the `root=` kernel parameter; the
//! other one is the passive bank that an update writes to.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::BankFallback;
use crate::error::FirmwareUpdateError;
use crate::wic::get_wic_partition_offset;

/// Root filesystem of bank A
pub const ROOTFS_A: &str = "/dev/mmcblk0p4";
/// Root filesystem of bank B
pub const ROOTFS_B: &str = "/dev/mmcblk0p8";
/// Kernel partition of bank A
pub const KERNEL_A: &str = "/dev/mmcblk0p3";
/// Kernel partition of bank B
pub const KERNEL_B: &str = "/dev/mmcblk0p7";

/// Boot bank identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bank {
    /// Bank A
    A,
    /// Bank B
    B,
}

impl Bank {
    /// Get the other bank
    pub fn other(self) -> Self {
        match self {
            Bank::A => Bank::B,
            Bank::B => Bank::A,
        }
    }

    /// Root filesystem device of this bank
    pub fn rootfs_device(self) -> &'static str {
        match self {
            Bank::A => ROOTFS_A,
            Bank::B => ROOTFS_B,
        }
    }

    /// Kernel partition device of this bank
    pub fn kernel_device(self) -> &'static str {
        match self {
            Bank::A => KERNEL_A,
            Bank::B => KERNEL_B,
        }
    }

    /// 1-based index of this bank's kernel partition inside the disk image
    pub fn kernel_image_index(self) -> u32 {
        match self {
            Bank::A => 3,
            Bank::B => 7,
        }
    }

    /// 1-based index of this bank's rootfs partition inside the disk image
    pub fn rootfs_image_index(self) -> u32 {
        match self {
            Bank::A => 4,
            Bank::B => 8,
        }
    }
}

impl std::fmt::Display for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bank::A => write!(f, "A"),
            Bank::B => write!(f, "B"),
        }
    }
}

/// Extract the value of the `root=` token from a kernel command line
pub fn root_device(cmdline: &str) -> Option<&str> {
    cmdline
        .split_whitespace()
        .find_map(|token| token.strip_prefix("root="))
}

/// Determine the booted bank from a kernel command line
pub fn detect_active_bank(
    cmdline: &str,
    fallback: BankFallback,
) -> Result<Bank, FirmwareUpdateError> {
    let Some(root) = root_device(cmdline) else {
        return Err(FirmwareUpdateError::BankDetectionFailed(
            "no root= parameter on the kernel command line".to_string(),
        ));
    };

    if root == ROOTFS_A {
        return Ok(Bank::A);
    }
    if root == ROOTFS_B {
        return Ok(Bank::B);
    }

    match fallback {
        BankFallback::Strict => Err(FirmwareUpdateError::BankDetectionFailed(format!(
            "root={root} matches neither {ROOTFS_A} nor {ROOTFS_B}"
        ))),
        BankFallback::Legacy => {
            warn!(root, "unrecognised root device, assuming bank B is active");
            Ok(Bank::B)
        }
    }
}

/// Bank layout for one update run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankInfo {
    /// Currently booted bank
    pub active_bank: Bank,

    /// Root filesystem device of the passive bank
    pub passive_rootfs: PathBuf,

    /// Kernel partition device of the passive bank
    pub passive_kernel: PathBuf,

    /// 1-based index of the passive kernel partition in the disk image
    pub passive_kernel_partition_index: u32,

    /// 1-based index of the passive rootfs partition in the disk image
    pub passive_rootfs_partition_index: u32,

    /// Byte offset of the kernel partition in the disk image
    pub passive_kernel_offset: u64,

    /// Byte offset of the rootfs partition in the disk image
    pub passive_rootfs_offset: u64,
}

impl BankInfo {
    /// Build the bank info for `active`, resolving offsets in `image`.
    pub fn resolve(active: Bank, image: &Path) -> Result<Self, FirmwareUpdateError> {
        let passive = active.other();
        let kernel_index = passive.kernel_image_index();
        let rootfs_index = passive.rootfs_image_index();

        let kernel_offset = get_wic_partition_offset(image, kernel_index);
        let rootfs_offset = get_wic_partition_offset(image, rootfs_index);
        let (Some(passive_kernel_offset), Some(passive_rootfs_offset)) =
            (kernel_offset, rootfs_offset)
        else {
            return Err(FirmwareUpdateError::PartitionFailed(format!(
                "cannot resolve partitions {kernel_index}/{rootfs_index} in {}",
                image.display()
            )));
        };

        debug!(
            active = %active,
            passive_kernel_offset,
            passive_rootfs_offset,
            "resolved bank layout"
        );

        Ok(Self {
            active_bank: active,
            passive_rootfs: PathBuf::from(passive.rootfs_device()),
            passive_kernel: PathBuf::from(passive.kernel_device()),
            passive_kernel_partition_index: kernel_index,
            passive_rootfs_partition_index: rootfs_index,
            passive_kernel_offset,
            passive_rootfs_offset,
        })
    }

    /// The bank being written
    pub fn passive_bank(&self) -> Bank {
        self.active_bank.other()
    }
}
