//! Updater configuration and progress reporting types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::FirmwareUpdateError;

/// Default scratch block device holding the downloaded image
pub const DEFAULT_STAGING_DEVICE: &str = "/dev/mmcblk0p16";
/// Default mount point of the staging device
pub const DEFAULT_STAGING_MOUNT: &str = "/staging";
/// Default path of the decompressed disk image
pub const DEFAULT_TEMP_IMAGE_PATH: &str = "/tmp/firmware.bin.wic";
/// Kernel boot parameters
pub const DEFAULT_CMDLINE_PATH: &str = "/proc/cmdline";
/// File name of the compressed image inside the staging mount
pub const COMPRESSED_IMAGE_NAME: &str = "firmware.bin.wic.bz2";

/// What to do when `root=` names neither bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankFallback {
    /// Fail with a bank-detection error
    #[default]
    Strict,
    /// Treat the device as running from bank B
    Legacy,
}

/// Scratch mount points used while writing and verifying partitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchMounts {
    /// Loop mount of the kernel partition inside the image
    pub kernel_source: PathBuf,
    /// Mount of the passive kernel partition
    pub kernel_target: PathBuf,
    /// Loop mount of the rootfs partition inside the image
    pub rootfs_source: PathBuf,
    /// Mount of the passive rootfs partition
    pub rootfs_target: PathBuf,
    /// Mount of the passive kernel partition during verification
    pub verify: PathBuf,
}

impl Default for ScratchMounts {
    fn default() -> Self {
        Self {
            kernel_source: PathBuf::from("/extblock/kernel_from_image"),
            kernel_target: PathBuf::from("/mnt/boot_b"),
            rootfs_source: PathBuf::from("/tmp/rootfs_from_image"),
            rootfs_target: PathBuf::from("/mnt/rootfs_b"),
            verify: PathBuf::from("/mnt/verify_kernel"),
        }
    }
}

/// First-stage bootloader (BL2) and firmware image package (FIP) locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootBlocks {
    /// Primary BL2 slot
    pub bl2_primary: PathBuf,
    /// Primary FIP slot
    pub fip_primary: PathBuf,
    /// Alternate BL2 slot
    pub bl2_alternate: PathBuf,
    /// Alternate FIP slot
    pub fip_alternate: PathBuf,
    /// Backup of the primary BL2 taken before switching
    pub bl2_backup: PathBuf,
    /// Backup of the primary FIP taken before switching
    pub fip_backup: PathBuf,
}

impl Default for BootBlocks {
    fn default() -> Self {
        Self {
            bl2_primary: PathBuf::from("/dev/mmcblk0p1"),
            fip_primary: PathBuf::from("/dev/mmcblk0p2"),
            bl2_alternate: PathBuf::from("/dev/mmcblk0p5"),
            fip_alternate: PathBuf::from("/dev/mmcblk0p6"),
            bl2_backup: PathBuf::from("/tmp/bl2_backup.img"),
            fip_backup: PathBuf::from("/tmp/fip_backup.bin"),
        }
    }
}

/// Configuration of a [`FirmwareUpdater`](crate::FirmwareUpdater)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Block device formatted and mounted as the staging area
    pub staging_device: PathBuf,

    /// Mount point of the staging area
    pub staging_mount: PathBuf,

    /// Where the decompressed disk image is written
    pub temp_image_path: PathBuf,

    /// File holding the kernel boot parameters
    pub cmdline_path: PathBuf,

    /// Scratch mount points
    pub scratch: ScratchMounts,

    /// Boot block slots switched after a verified update
    pub boot_blocks: BootBlocks,

    /// Kill external commands running longer than this; `None` waits forever
    pub command_timeout_secs: Option<u64>,

    /// Bank detection policy for unrecognised `root=` values
    pub bank_fallback: BankFallback,

    /// Progress callback
    #[serde(skip)]
    pub progress: Option<ProgressCallback>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            staging_device: PathBuf::from(DEFAULT_STAGING_DEVICE),
            staging_mount: PathBuf::from(DEFAULT_STAGING_MOUNT),
            temp_image_path: PathBuf::from(DEFAULT_TEMP_IMAGE_PATH),
            cmdline_path: PathBuf::from(DEFAULT_CMDLINE_PATH),
            scratch: ScratchMounts::default(),
            boot_blocks: BootBlocks::default(),
            command_timeout_secs: None,
            bank_fallback: BankFallback::default(),
            progress: None,
        }
    }
}

impl UpdateConfig {
    /// Load a configuration from a YAML file; missing keys take defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, FirmwareUpdateError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FirmwareUpdateError::FileNotFound(format!("{}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a configuration from YAML text; missing keys take defaults.
    pub fn from_yaml_str(contents: &str) -> Result<Self, FirmwareUpdateError> {
        let config: UpdateConfig = serde_yaml::from_str(contents)
            .map_err(|e| FirmwareUpdateError::invalid(format!("configuration: {e}")))?;
        Ok(config.normalized())
    }

    /// Attach a progress callback.
    pub fn with_progress(
        mut self,
        callback: impl Fn(&UpdateProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(ProgressCallback::new(callback));
        self
    }

    /// Replace empty paths with their defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = UpdateConfig::default();
        fill(&mut self.staging_device, defaults.staging_device);
        fill(&mut self.staging_mount, defaults.staging_mount);
        fill(&mut self.temp_image_path, defaults.temp_image_path);
        fill(&mut self.cmdline_path, defaults.cmdline_path);

        let scratch = defaults.scratch;
        fill(&mut self.scratch.kernel_source, scratch.kernel_source);
        fill(&mut self.scratch.kernel_target, scratch.kernel_target);
        fill(&mut self.scratch.rootfs_source, scratch.rootfs_source);
        fill(&mut self.scratch.rootfs_target, scratch.rootfs_target);
        fill(&mut self.scratch.verify, scratch.verify);

        let blocks = defaults.boot_blocks;
        fill(&mut self.boot_blocks.bl2_primary, blocks.bl2_primary);
        fill(&mut self.boot_blocks.fip_primary, blocks.fip_primary);
        fill(&mut self.boot_blocks.bl2_alternate, blocks.bl2_alternate);
        fill(&mut self.boot_blocks.fip_alternate, blocks.fip_alternate);
        fill(&mut self.boot_blocks.bl2_backup, blocks.bl2_backup);
        fill(&mut self.boot_blocks.fip_backup, blocks.fip_backup);
        self
    }

    /// Path of the compressed image inside the staging mount
    pub fn compressed_image_path(&self) -> PathBuf {
        self.staging_mount.join(COMPRESSED_IMAGE_NAME)
    }

    /// Per-command timeout
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

fn fill(path: &mut PathBuf, default: PathBuf) {
    if path.as_os_str().is_empty() {
        *path = default;
    }
}

/// Stage names reported to progress listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    /// Updater initialisation
    Init,
    /// Firmware update pipeline
    Update,
    /// Updater teardown
    Cleanup,
}

impl ProgressStage {
    /// Stage name as reported to listeners
    pub const fn as_str(self) -> &'static str {
        match self {
            ProgressStage::Init => "init",
            ProgressStage::Update => "update",
            ProgressStage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProgress {
    /// Stage reporting progress
    pub stage: ProgressStage,
    /// Progress percentage (0-100)
    pub percent: u8,
    /// Status message
    pub message: String,
}

/// Shared progress callback
#[derive(Clone)]
pub struct ProgressCallback(Arc<dyn Fn(&UpdateProgress) + Send + Sync>);

impl ProgressCallback {
    /// Wrap a closure as a progress callback
    pub fn new(callback: impl Fn(&UpdateProgress) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    /// Invoke the callback
    pub fn call(&self, progress: &UpdateProgress) {
        (self.0)(progress);
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressCallback(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_platform() {
        let config = UpdateConfig::default();
        assert_eq!(config.staging_device, PathBuf::from("/dev/mmcblk0p16"));
        assert_eq!(config.staging_mount, PathBuf::from("/staging"));
        assert_eq!(config.temp_image_path, PathBuf::from("/tmp/firmware.bin.wic"));
        assert_eq!(
            config.compressed_image_path(),
            PathBuf::from("/staging/firmware.bin.wic.bz2")
        );
        assert_eq!(config.bank_fallback, BankFallback::Strict);
        assert!(config.command_timeout().is_none());
    }

    #[test]
    fn test_normalized_fills_empty_paths() {
        let config = UpdateConfig {
            staging_device: PathBuf::new(),
            staging_mount: PathBuf::from("/custom"),
            temp_image_path: PathBuf::new(),
            ..UpdateConfig::default()
        }
        .normalized();

        assert_eq!(config.staging_device, PathBuf::from(DEFAULT_STAGING_DEVICE));
        assert_eq!(config.staging_mount, PathBuf::from("/custom"));
        assert_eq!(config.temp_image_path, PathBuf::from(DEFAULT_TEMP_IMAGE_PATH));
    }

    #[test]
    fn test_partial_yaml() -> Result<(), FirmwareUpdateError> {
        let config = UpdateConfig::from_yaml_str(
            "staging_mount: /data/staging\n\
             command_timeout_secs: 600\n\
             bank_fallback: legacy\n\
             boot_blocks:\n  bl2_backup: /data/bl2.img\n",
        )?;
        assert_eq!(config.staging_mount, PathBuf::from("/data/staging"));
        assert_eq!(config.staging_device, PathBuf::from(DEFAULT_STAGING_DEVICE));
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.bank_fallback, BankFallback::Legacy);
        assert_eq!(config.boot_blocks.bl2_backup, PathBuf::from("/data/bl2.img"));
        assert_eq!(config.boot_blocks.bl2_primary, PathBuf::from("/dev/mmcblk0p1"));
        Ok(())
    }

    #[test]
    fn test_invalid_yaml_is_invalid_parameter() {
        let result = UpdateConfig::from_yaml_str("staging_mount: [not, a, path");
        assert!(matches!(
            result,
            Err(FirmwareUpdateError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_progress_stage_names() {
        assert_eq!(ProgressStage::Init.to_string(), "init");
        assert_eq!(ProgressStage::Update.to_string(), "update");
        assert_eq!(ProgressStage::Cleanup.to_string(), "cleanup");
    }
}
