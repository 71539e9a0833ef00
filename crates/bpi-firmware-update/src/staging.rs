//! Staging area preparation

use tracing::{debug, info};

use crate::error::FirmwareUpdateError;
use crate::mounts::create_dir;
use crate::platform::{BlockMount, Filesystem, SystemCommand};
use crate::updater::FirmwareUpdater;

/// Volume label given to the staging filesystem
pub const STAGING_LABEL: &str = "staging";

impl FirmwareUpdater {
    /// Format the staging device as ext4 and mount it.
    ///
    /// A staging area left mounted by an earlier run is unmounted before the
    /// device is reformatted. A successful format is not undone when the
    /// mount fails.
    pub async fn create_staging_area(&mut self) -> Result<(), FirmwareUpdateError> {
        let config = self.require_config()?;
        let device = config.staging_device.clone();
        let mount_point = config.staging_mount.clone();

        if self.staging_mounted {
            debug!(mount = %mount_point.display(), "unmounting previous staging area");
            self.platform.unmount(&mount_point).await.map_err(|e| {
                FirmwareUpdateError::MountFailed(format!(
                    "staging area still mounted at {}: {e}",
                    mount_point.display()
                ))
            })?;
            self.staging_mounted = false;
        }

        create_dir(&mount_point).await.map_err(|e| {
            FirmwareUpdateError::MountFailed(format!("{}: {e}", mount_point.display()))
        })?;

        let format = SystemCommand::MakeFilesystem {
            device: device.clone(),
            filesystem: Filesystem::Ext4,
            label: Some(STAGING_LABEL.to_string()),
        };
        self.platform
            .execute(&format, &self.exec)
            .await
            .map_err(|e| FirmwareUpdateError::PartitionFailed(e.to_string()))?;

        let mount = BlockMount {
            device,
            target: mount_point,
            filesystem: Filesystem::Ext4,
        };
        self.platform
            .mount(&mount)
            .await
            .map_err(|e| FirmwareUpdateError::MountFailed(e.to_string()))?;
        self.staging_mounted = true;

        info!(
            device = %mount.device.display(),
            mount = %mount.target.display(),
            "staging area ready"
        );
        Ok(())
    }
}
