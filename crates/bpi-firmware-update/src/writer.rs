//! Passive partition writer
//!
//! Both partitions of the passive bank are written the same way: loop-mount
//! the matching partition of the decompressed image, reformat the passive
//! device, mount it and mirror the image contents onto it.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::bank::BankInfo;
use crate::error::FirmwareUpdateError;
use crate::mounts::{MountScope, create_dir, remove_scratch_dir};
use crate::platform::{BlockMount, Filesystem, SystemCommand};
use crate::updater::FirmwareUpdater;

/// Boot image that must be present in a kernel partition
pub const KERNEL_MARKER: &str = "fitImage";

/// One partition copy from the image to the passive bank
#[derive(Debug, Clone)]
struct PartitionJob<'a> {
    name: &'static str,
    image: &'a Path,
    offset: u64,
    source_dir: &'a Path,
    device: &'a Path,
    target_dir: &'a Path,
    filesystem: Filesystem,
    marker: Option<&'static str>,
}

impl FirmwareUpdater {
    /// Write the passive kernel partition from the image (FAT32).
    pub async fn update_kernel_partition(
        &self,
        bank: &BankInfo,
    ) -> Result<(), FirmwareUpdateError> {
        let config = self.require_config()?;
        let job = PartitionJob {
            name: "kernel",
            image: &config.temp_image_path,
            offset: bank.passive_kernel_offset,
            source_dir: &config.scratch.kernel_source,
            device: &bank.passive_kernel,
            target_dir: &config.scratch.kernel_target,
            filesystem: Filesystem::Vfat32,
            marker: Some(KERNEL_MARKER),
        };
        self.write_partition(&job).await
    }

    /// Write the passive root filesystem from the image (ext4).
    pub async fn update_rootfs_partition(
        &self,
        bank: &BankInfo,
    ) -> Result<(), FirmwareUpdateError> {
        let config = self.require_config()?;
        let job = PartitionJob {
            name: "rootfs",
            image: &config.temp_image_path,
            offset: bank.passive_rootfs_offset,
            source_dir: &config.scratch.rootfs_source,
            device: &bank.passive_rootfs,
            target_dir: &config.scratch.rootfs_target,
            filesystem: Filesystem::Ext4,
            marker: None,
        };
        self.write_partition(&job).await
    }

    async fn write_partition(&self, job: &PartitionJob<'_>) -> Result<(), FirmwareUpdateError> {
        info!(
            partition = job.name,
            device = %job.device.display(),
            offset = job.offset,
            "writing passive partition"
        );

        let mut mounts = MountScope::new(self.platform.as_ref());
        let outcome = self.copy_partition(job, &mut mounts).await;
        mounts.release().await;

        remove_scratch_dir(job.source_dir).await;
        remove_scratch_dir(job.target_dir).await;

        if outcome.is_ok() {
            info!(partition = job.name, "passive partition written");
        }
        outcome
    }

    async fn copy_partition(
        &self,
        job: &PartitionJob<'_>,
        mounts: &mut MountScope<'_>,
    ) -> Result<(), FirmwareUpdateError> {
        create_dir(job.source_dir).await.map_err(|e| mount_error(job.source_dir, e))?;
        mounts
            .loop_mount(job.image, job.offset, job.source_dir, &self.exec)
            .await
            .map_err(|e| FirmwareUpdateError::MountFailed(e.to_string()))?;

        if let Err(e) = self.platform.unmount_device(job.device).await {
            warn!(device = %job.device.display(), error = %e, "passive partition still mounted");
        }

        let format = SystemCommand::MakeFilesystem {
            device: job.device.to_path_buf(),
            filesystem: job.filesystem,
            label: None,
        };
        self.platform
            .execute(&format, &self.exec)
            .await
            .map_err(|e| FirmwareUpdateError::PartitionFailed(e.to_string()))?;

        create_dir(job.target_dir).await.map_err(|e| mount_error(job.target_dir, e))?;
        mounts
            .mount(&BlockMount {
                device: job.device.to_path_buf(),
                target: job.target_dir.to_path_buf(),
                filesystem: job.filesystem,
            })
            .await
            .map_err(|e| FirmwareUpdateError::MountFailed(e.to_string()))?;

        if let Some(marker) = job.marker {
            let marker_path: PathBuf = job.source_dir.join(marker);
            if !tokio::fs::try_exists(&marker_path).await.unwrap_or(false) {
                return Err(FirmwareUpdateError::FileNotFound(
                    marker_path.display().to_string(),
                ));
            }
        }

        let mirror = SystemCommand::Mirror {
            source: job.source_dir.to_path_buf(),
            destination: job.target_dir.to_path_buf(),
        };
        self.platform
            .execute(&mirror, &self.exec)
            .await
            .map_err(|e| FirmwareUpdateError::system(e.to_string()))?;

        if let Err(e) = self.platform.sync().await {
            warn!(error = %e, "sync failed");
        }
        Ok(())
    }
}

fn mount_error(path: &Path, e: std::io::Error) -> FirmwareUpdateError {
    FirmwareUpdateError::MountFailed(format!("{}: {e}", path.display()))
}
