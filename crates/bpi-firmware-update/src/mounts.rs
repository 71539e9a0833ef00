//! Scoped mounts
//!
//! A [`MountScope`] remembers every mount made during one stage and unmounts
//! them in reverse order when released, whatever the outcome of the stage.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::platform::{BlockMount, CommandError, ExecOptions, Platform, SystemCommand};

/// Mounts owned by one stage invocation
pub struct MountScope<'a> {
    platform: &'a dyn Platform,
    mounted: Vec<PathBuf>,
}

impl<'a> MountScope<'a> {
    /// Start an empty scope
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self {
            platform,
            mounted: Vec::new(),
        }
    }

    /// Mount a block device and record it
    pub async fn mount(&mut self, mount: &BlockMount) -> Result<(), CommandError> {
        self.platform.mount(mount).await?;
        self.mounted.push(mount.target.clone());
        Ok(())
    }

    /// Loop-mount a partition of a disk image read-only and record it
    pub async fn loop_mount(
        &mut self,
        image: &Path,
        offset: u64,
        target: &Path,
        options: &ExecOptions,
    ) -> Result<(), CommandError> {
        let command = SystemCommand::LoopMount {
            image: image.to_path_buf(),
            offset,
            target: target.to_path_buf(),
        };
        self.platform.execute(&command, options).await?;
        self.mounted.push(target.to_path_buf());
        Ok(())
    }

    /// Mount points currently held, oldest first
    pub fn targets(&self) -> &[PathBuf] {
        &self.mounted
    }

    /// Unmount everything in reverse order. Failures are logged, not returned.
    pub async fn release(mut self) {
        while let Some(target) = self.mounted.pop() {
            match self.platform.unmount(&target).await {
                Ok(()) => debug!(target = %target.display(), "unmounted"),
                Err(e) => warn!(target = %target.display(), error = %e, "unmount failed"),
            }
        }
    }
}

impl Drop for MountScope<'_> {
    fn drop(&mut self) {
        if !self.mounted.is_empty() {
            error!(mounts = ?self.mounted, "mount scope dropped without release");
        }
    }
}

/// Create a scratch mount point
pub(crate) async fn create_dir(path: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(path).await
}

/// Remove a scratch mount point if it is empty
pub(crate) async fn remove_scratch_dir(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir(path).await {
        debug!(path = %path.display(), error = %e, "scratch directory left in place");
    }
}
