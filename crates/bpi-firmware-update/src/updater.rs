//! Update context and pipeline orchestration
//!
//! [`FirmwareUpdater`] is the explicit context every operation runs against:
//! it owns the configuration set by [`FirmwareUpdater::init`], the command
//! environment computed by [`FirmwareUpdater::setup_environment`] and the
//! [`Platform`] used for all privileged work. Stage entry points live in the
//! stage modules as further `impl FirmwareUpdater` blocks.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::bank::{BankInfo, detect_active_bank};
use crate::boot_switch::BootSwitchState;
use crate::config::{ProgressStage, UpdateConfig, UpdateProgress};
use crate::error::FirmwareUpdateError;
use crate::platform::{ExecOptions, Platform};

const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Directories appended to `PATH` for external commands
pub const EXTRA_SEARCH_PATH: &str =
    "/usr/bin:/bin:/usr/local/bin:/sbin:/usr/local/lighttpd/sbin:/usr/local/sbin";

/// Directories appended to `LD_LIBRARY_PATH` for external commands
pub const EXTRA_LIBRARY_PATH: &str = "/usr/local/lib";

/// Outcome of the kernel integrity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    /// Written kernel matches the image
    Verified {
        /// SHA-256 of the kernel image
        checksum: String,
    },
    /// Written kernel differs from the image; the boot switch was skipped
    Mismatch {
        /// SHA-256 of the kernel inside the downloaded image
        expected: String,
        /// SHA-256 of the kernel read back from the passive partition
        written: String,
    },
}

impl Verification {
    /// Whether the written kernel matched
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified { .. })
    }
}

/// Summary of a completed [`FirmwareUpdater::update_firmware`] run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Bank layout the update was written with
    pub bank: BankInfo,
    /// Kernel integrity check outcome
    pub verification: Verification,
    /// State the boot switch reached
    pub boot_switch: BootSwitchState,
}

/// Firmware update context
pub struct FirmwareUpdater {
    pub(crate) platform: Arc<dyn Platform>,
    config: Option<UpdateConfig>,
    pub(crate) exec: ExecOptions,
    pub(crate) staging_mounted: bool,
    progress_tx: broadcast::Sender<UpdateProgress>,
}

impl std::fmt::Debug for FirmwareUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareUpdater")
            .field("config", &self.config)
            .field("exec", &self.exec)
            .field("staging_mounted", &self.staging_mounted)
            .finish_non_exhaustive()
    }
}

impl FirmwareUpdater {
    /// Create an uninitialised updater on top of `platform`
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            platform,
            config: None,
            exec: ExecOptions::default(),
            staging_mounted: false,
            progress_tx,
        }
    }

    /// Create an uninitialised updater driving the running Linux system
    #[cfg(target_os = "linux")]
    pub fn linux() -> Self {
        Self::new(Arc::new(crate::platform::LinuxPlatform::new()))
    }

    /// Initialise with `config`, or the defaults when `None`.
    ///
    /// Initialising an already initialised updater is a successful no-op; the
    /// new configuration is ignored.
    pub fn init(&mut self, config: Option<UpdateConfig>) -> Result<(), FirmwareUpdateError> {
        if self.config.is_some() {
            debug!("updater already initialised");
            return Ok(());
        }

        let config = config.unwrap_or_default().normalized();
        self.exec.timeout = config.command_timeout();
        debug!(
            staging_device = %config.staging_device.display(),
            staging_mount = %config.staging_mount.display(),
            temp_image = %config.temp_image_path.display(),
            "updater initialised"
        );
        self.config = Some(config);
        self.report(ProgressStage::Init, 0, "Library initialized");
        Ok(())
    }

    /// Whether [`init`](Self::init) has run since the last cleanup
    pub fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    /// Active configuration, if initialised
    pub fn config(&self) -> Option<&UpdateConfig> {
        self.config.as_ref()
    }

    /// Environment and limits applied to external commands
    pub fn exec_options(&self) -> &ExecOptions {
        &self.exec
    }

    /// Receive every progress report from now on
    pub fn subscribe_progress(&self) -> broadcast::Receiver<UpdateProgress> {
        self.progress_tx.subscribe()
    }

    /// Unmount the staging area and delete temporary artifacts.
    ///
    /// Does nothing when not initialised. Individual cleanup failures are
    /// logged and do not stop the remaining steps.
    pub async fn cleanup(&mut self) {
        let Some(config) = self.config.clone() else {
            return;
        };

        match self.platform.unmount(&config.staging_mount).await {
            Ok(()) => debug!(mount = %config.staging_mount.display(), "staging unmounted"),
            Err(e) if self.staging_mounted => {
                warn!(
                    mount = %config.staging_mount.display(),
                    error = %e,
                    "failed to unmount staging area"
                );
            }
            Err(e) => debug!(error = %e, "staging area was not mounted"),
        }
        self.staging_mounted = false;

        for artifact in [
            &config.temp_image_path,
            &config.boot_blocks.bl2_backup,
            &config.boot_blocks.fip_backup,
        ] {
            remove_artifact(artifact).await;
        }

        self.report(ProgressStage::Cleanup, 100, "Library cleanup complete");
        self.config = None;
    }

    /// Extend the command search paths used for every external command.
    ///
    /// The process environment is left untouched; the extended values are
    /// passed to each spawned command.
    pub fn setup_environment(&mut self) -> Result<(), FirmwareUpdateError> {
        self.require_config()?;
        self.exec.search_path = Some(extend_path_var("PATH", EXTRA_SEARCH_PATH));
        self.exec.library_path = Some(extend_path_var("LD_LIBRARY_PATH", EXTRA_LIBRARY_PATH));
        debug!(exec = ?self.exec, "command environment prepared");
        Ok(())
    }

    /// Detect the booted bank and resolve the passive partitions inside the
    /// decompressed image.
    pub async fn get_bank_info(&self) -> Result<BankInfo, FirmwareUpdateError> {
        let config = self.require_config()?;
        let cmdline = tokio::fs::read_to_string(&config.cmdline_path)
            .await
            .map_err(|e| {
                FirmwareUpdateError::BankDetectionFailed(format!(
                    "{}: {e}",
                    config.cmdline_path.display()
                ))
            })?;
        let first_line = cmdline.lines().next().unwrap_or_default();

        let active = detect_active_bank(first_line, config.bank_fallback)?;
        info!(active = %active, passive = %active.other(), "bank detected");
        BankInfo::resolve(active, &config.temp_image_path)
    }

    /// Run the full update pipeline for the image at `location`.
    ///
    /// Stops at the first failing stage. A kernel checksum mismatch is the one
    /// exception: the boot switch is skipped and the run still succeeds, with
    /// the mismatch recorded in the returned report.
    pub async fn update_firmware(
        &mut self,
        location: &str,
    ) -> Result<UpdateReport, FirmwareUpdateError> {
        self.require_config()?;
        if location.trim().is_empty() {
            return Err(FirmwareUpdateError::invalid("empty image location"));
        }

        self.report(ProgressStage::Update, 0, "Starting firmware update");

        self.setup_environment()?;
        self.report(ProgressStage::Update, 10, "Environment setup complete");

        self.create_staging_area().await?;
        self.report(ProgressStage::Update, 20, "Staging area created");

        self.download_firmware(location).await?;
        self.report(ProgressStage::Update, 30, "Firmware downloaded");

        self.decompress_image().await?;
        self.report(ProgressStage::Update, 40, "Image decompressed");

        let bank = self.get_bank_info().await?;
        self.report(ProgressStage::Update, 50, "Bank information determined");

        self.update_kernel_partition(&bank).await?;
        self.report(ProgressStage::Update, 70, "Kernel partition updated");

        self.update_rootfs_partition(&bank).await?;
        self.report(ProgressStage::Update, 80, "Rootfs partition updated");

        let verification = match self.verify_kernel(&bank).await {
            Ok(checksum) => {
                self.report(ProgressStage::Update, 90, "Kernel verification successful");
                Verification::Verified { checksum }
            }
            Err(FirmwareUpdateError::ChecksumMismatch { expected, written }) => {
                warn!(%expected, %written, "kernel checksum mismatch, boot banks left unchanged");
                self.report(
                    ProgressStage::Update,
                    85,
                    "Kernel verification failed - skipping boot switch",
                );
                Verification::Mismatch { expected, written }
            }
            Err(e) => return Err(e),
        };

        let boot_switch = self
            .perform_boot_switch(verification.is_verified())
            .await?;
        self.report(ProgressStage::Update, 100, "Firmware update complete");

        Ok(UpdateReport {
            bank,
            verification,
            boot_switch,
        })
    }

    /// Force an immediate reboot. Returns only if the reboot was refused.
    pub async fn reboot_system(&self) -> Result<(), FirmwareUpdateError> {
        warn!("rebooting system");
        self.platform
            .reboot()
            .await
            .map_err(|e| FirmwareUpdateError::system(e.to_string()))
    }

    pub(crate) fn require_config(&self) -> Result<&UpdateConfig, FirmwareUpdateError> {
        self.config
            .as_ref()
            .ok_or_else(|| FirmwareUpdateError::invalid("updater is not initialised"))
    }

    pub(crate) fn report(&self, stage: ProgressStage, percent: u8, message: &str) {
        let progress = UpdateProgress {
            stage,
            percent,
            message: message.to_string(),
        };
        info!(stage = %stage, percent, "{message}");

        if let Some(callback) = self.config.as_ref().and_then(|c| c.progress.as_ref()) {
            callback.call(&progress);
        }
        if let Err(e) = self.progress_tx.send(progress) {
            trace!(error = %e, "no progress subscribers");
        }
    }
}

fn extend_path_var(name: &str, extra: &str) -> OsString {
    let mut value = std::env::var_os(name).unwrap_or_default();
    if !value.is_empty() {
        value.push(":");
    }
    value.push(extra);
    value
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temporary file"),
    }
}
