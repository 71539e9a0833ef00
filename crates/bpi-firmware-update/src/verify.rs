//! Kernel integrity verification

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::bank::BankInfo;
use crate::error::FirmwareUpdateError;
use crate::mounts::{MountScope, create_dir, remove_scratch_dir};
use crate::platform::{BlockMount, Filesystem};
use crate::updater::FirmwareUpdater;
use crate::writer::KERNEL_MARKER;

/// Compute the hex-encoded SHA-256 of a file
pub async fn compute_file_hash(file_path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(file_path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }

    Ok(hex::encode(hasher.finalize()))
}

impl FirmwareUpdater {
    /// Compare the kernel written to the passive bank with the one in the
    /// image.
    ///
    /// Returns the shared checksum. Differing checksums fail with
    /// [`FirmwareUpdateError::ChecksumMismatch`]; a kernel that cannot be
    /// mounted or read on either side fails with
    /// [`FirmwareUpdateError::FileNotFound`].
    pub async fn verify_kernel(&self, bank: &BankInfo) -> Result<String, FirmwareUpdateError> {
        let config = self.require_config()?;

        let written = {
            let dir = &config.scratch.verify;
            let mut mounts = MountScope::new(self.platform.as_ref());
            let mount = BlockMount {
                device: bank.passive_kernel.clone(),
                target: dir.clone(),
                filesystem: Filesystem::Vfat32,
            };
            let hashed = match create_dir(dir).await {
                Ok(()) => match mounts.mount(&mount).await {
                    Ok(()) => hash_marker(dir).await,
                    Err(e) => Err(unreadable(dir, &e)),
                },
                Err(e) => Err(unreadable(dir, &e)),
            };
            mounts.release().await;
            remove_scratch_dir(dir).await;
            hashed?
        };

        let expected = {
            let dir = &config.scratch.kernel_source;
            let mut mounts = MountScope::new(self.platform.as_ref());
            let hashed = match create_dir(dir).await {
                Ok(()) => match mounts
                    .loop_mount(
                        &config.temp_image_path,
                        bank.passive_kernel_offset,
                        dir,
                        &self.exec,
                    )
                    .await
                {
                    Ok(()) => hash_marker(dir).await,
                    Err(e) => Err(unreadable(dir, &e)),
                },
                Err(e) => Err(unreadable(dir, &e)),
            };
            mounts.release().await;
            remove_scratch_dir(dir).await;
            hashed?
        };

        debug!(%expected, %written, "kernel checksums");
        if expected != written {
            return Err(FirmwareUpdateError::ChecksumMismatch { expected, written });
        }

        info!(checksum = %written, "kernel verified");
        Ok(written)
    }
}

async fn hash_marker(dir: &Path) -> Result<String, FirmwareUpdateError> {
    let marker = dir.join(KERNEL_MARKER);
    compute_file_hash(&marker)
        .await
        .map_err(|e| unreadable(&marker, &e))
}

fn unreadable(path: &Path, e: &dyn std::fmt::Display) -> FirmwareUpdateError {
    FirmwareUpdateError::FileNotFound(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_hash() -> Result<(), Box<dyn std::error::Error>> {
        let temp_file = tempfile::NamedTempFile::new()?;
        tokio::fs::write(temp_file.path(), b"abc").await?;

        let hash = compute_file_hash(temp_file.path()).await?;
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_marker_is_file_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let result = hash_marker(dir.path()).await;
        assert!(matches!(result, Err(FirmwareUpdateError::FileNotFound(_))));
        Ok(())
    }
}
