//! Command definitions and handlers

pub mod inspect;
pub mod stage;
pub mod update;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use bpi_firmware_update::prelude::*;
use clap::{Args, Subcommand};

use crate::error::CliError;

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    pub json: bool,

    /// YAML configuration file
    #[arg(long, global = true, env = "BPIFWCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Block device used as the staging area
    #[arg(long, global = true)]
    pub staging_device: Option<PathBuf>,

    /// Mount point of the staging area
    #[arg(long, global = true)]
    pub staging_mount: Option<PathBuf>,

    /// Path of the decompressed disk image
    #[arg(long, global = true)]
    pub temp_image: Option<PathBuf>,
}

impl GlobalOptions {
    /// Configuration file merged with command line overrides
    pub fn update_config(&self) -> Result<UpdateConfig> {
        let mut config = match &self.config {
            Some(path) => UpdateConfig::from_yaml_file(path)?,
            None => UpdateConfig::default(),
        };
        if let Some(device) = &self.staging_device {
            config.staging_device = device.clone();
        }
        if let Some(mount) = &self.staging_mount {
            config.staging_mount = mount.clone();
        }
        if let Some(image) = &self.temp_image {
            config.temp_image_path = image.clone();
        }
        Ok(config.normalized())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full update pipeline against the passive bank
    Update {
        /// Firmware URL (http/https) or local path
        location: String,

        /// Reboot once the boot blocks have been switched
        #[arg(long)]
        reboot: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the active and passive bank layout
    BankInfo,

    /// Print the byte offset of a partition inside a disk image
    WicOffset {
        /// Disk image
        image: PathBuf,

        /// 1-based partition index
        index: u32,
    },

    /// List the partitions of a disk image
    Partitions {
        /// Disk image
        image: PathBuf,
    },

    /// Format and mount the staging area
    Staging {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Download a compressed image into the staging area
    Download {
        /// Firmware URL (http/https) or local path
        location: String,
    },

    /// Decompress the staged image
    Decompress,

    /// Mirror the image's kernel partition onto the passive bank
    WriteKernel {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Mirror the image's root filesystem onto the passive bank
    WriteRootfs {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Compare the passive kernel with the image
    Verify,

    /// Switch the boot blocks to the alternate slot
    BootSwitch {
        /// Actually write the boot blocks; without it nothing is touched
        #[arg(long)]
        enable: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List error codes and their descriptions
    Errors,

    /// Unmount the staging area and remove temporary files
    Cleanup,

    /// Reboot the board
    Reboot {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Ask before a destructive action unless `yes` was given.
///
/// Without a terminal there is nobody to ask, so the action is refused.
pub fn confirm(action: &str, yes: bool) -> Result<()> {
    if yes {
        return Ok(());
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::ConfirmationRequired(action.to_string()).into());
    }

    let confirmed = dialoguer::Confirm::new()
        .with_prompt(format!("{action}?"))
        .default(false)
        .interact()?;
    if confirmed {
        Ok(())
    } else {
        Err(CliError::Aborted.into())
    }
}

/// An initialized updater for the running board
pub fn board_updater(config: UpdateConfig) -> Result<FirmwareUpdater> {
    let mut updater = platform_updater()?;
    updater.init(Some(config))?;
    updater.setup_environment()?;
    Ok(updater)
}

#[cfg(target_os = "linux")]
fn platform_updater() -> Result<FirmwareUpdater> {
    Ok(FirmwareUpdater::linux())
}

#[cfg(not(target_os = "linux"))]
fn platform_updater() -> Result<FirmwareUpdater> {
    anyhow::bail!("updates are not supported on {}", std::env::consts::OS)
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_overrides_replace_config_values() -> TestResult {
        let opts = GlobalOptions {
            staging_device: Some(PathBuf::from("/dev/sdz1")),
            temp_image: Some(PathBuf::from("/tmp/fw.wic")),
            ..GlobalOptions::default()
        };
        let config = opts.update_config()?;
        assert_eq!(config.staging_device, PathBuf::from("/dev/sdz1"));
        assert_eq!(config.temp_image_path, PathBuf::from("/tmp/fw.wic"));
        assert_eq!(config.staging_mount, UpdateConfig::default().staging_mount);
        Ok(())
    }

    #[test]
    fn test_config_file_is_merged() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bpifw.yaml");
        std::fs::write(&path, "staging_mount: /mnt/stage\ncommand_timeout_secs: 30\n")?;

        let opts = GlobalOptions {
            config: Some(path),
            staging_mount: Some(PathBuf::from("/mnt/override")),
            ..GlobalOptions::default()
        };
        let config = opts.update_config()?;
        assert_eq!(config.staging_mount, PathBuf::from("/mnt/override"));
        assert_eq!(config.command_timeout_secs, Some(30));
        Ok(())
    }

    #[test]
    fn test_missing_config_file_is_file_not_found() {
        let opts = GlobalOptions {
            config: Some(PathBuf::from("/nonexistent/bpifw.yaml")),
            ..GlobalOptions::default()
        };
        let result = opts.update_config();
        assert!(matches!(
            result.map_err(|e| e.downcast::<FirmwareUpdateError>().map(|e| e.kind())),
            Err(Ok(ErrorKind::FileNotFound))
        ));
    }

    #[test]
    fn test_confirm_with_yes_skips_prompt() -> TestResult {
        confirm("Erase everything", true)?;
        Ok(())
    }
}
