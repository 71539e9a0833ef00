//! Individual pipeline stages
//!
//! Each command runs one stage against the configured paths and leaves its
//! results in place, so stages can be run one after another by hand.

use anyhow::Result;
use bpi_firmware_update::prelude::*;
use serde_json::json;

use crate::commands::{GlobalOptions, board_updater, confirm};
use crate::output;

pub async fn staging(opts: &GlobalOptions, yes: bool) -> Result<()> {
    let config = opts.update_config()?;
    confirm(
        &format!("Format {} as the staging area", config.staging_device.display()),
        yes,
    )?;

    let mount = config.staging_mount.clone();
    let mut updater = board_updater(config)?;
    updater.create_staging_area().await?;
    output::print_success(
        &format!("Staging area mounted at {}", mount.display()),
        json!({ "staging_mount": mount }),
        opts.json,
    );
    Ok(())
}

pub async fn download(opts: &GlobalOptions, location: &str) -> Result<()> {
    let updater = board_updater(opts.update_config()?)?;
    updater.download_firmware(location).await?;

    let target = updater
        .config()
        .map(UpdateConfig::compressed_image_path)
        .unwrap_or_default();
    output::print_success(
        &format!("Downloaded {} to {}", location, target.display()),
        json!({ "path": target }),
        opts.json,
    );
    Ok(())
}

pub async fn decompress(opts: &GlobalOptions) -> Result<()> {
    let config = opts.update_config()?;
    let target = config.temp_image_path.clone();
    let updater = board_updater(config)?;
    updater.decompress_image().await?;
    output::print_success(
        &format!("Image decompressed to {}", target.display()),
        json!({ "path": target }),
        opts.json,
    );
    Ok(())
}

/// Which passive partition a write command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Kernel,
    Rootfs,
}

pub async fn write(opts: &GlobalOptions, partition: Partition, yes: bool) -> Result<()> {
    let updater = board_updater(opts.update_config()?)?;
    let bank = updater.get_bank_info().await?;

    let device = match partition {
        Partition::Kernel => &bank.passive_kernel,
        Partition::Rootfs => &bank.passive_rootfs,
    };
    confirm(
        &format!(
            "Erase {} (bank {}) and write the image's {:?} partition",
            device.display(),
            bank.passive_bank(),
            partition
        ),
        yes,
    )?;

    match partition {
        Partition::Kernel => updater.update_kernel_partition(&bank).await?,
        Partition::Rootfs => updater.update_rootfs_partition(&bank).await?,
    }
    output::print_success(
        &format!("{} written", device.display()),
        json!({ "device": device, "bank": bank.passive_bank() }),
        opts.json,
    );
    Ok(())
}

pub async fn verify(opts: &GlobalOptions) -> Result<()> {
    let updater = board_updater(opts.update_config()?)?;
    let bank = updater.get_bank_info().await?;
    let checksum = updater.verify_kernel(&bank).await?;
    output::print_success(
        &format!("Kernel on {} verified", bank.passive_kernel.display()),
        json!({ "checksum": checksum }),
        opts.json,
    );
    Ok(())
}

pub async fn boot_switch(opts: &GlobalOptions, enable: bool, yes: bool) -> Result<()> {
    if enable {
        confirm("Overwrite the BL2/FIP boot blocks", yes)?;
    }
    let updater = board_updater(opts.update_config()?)?;
    let state = updater.perform_boot_switch(enable).await?;
    output::print_success(
        &format!("Boot switch {}", state),
        json!({ "state": state }),
        opts.json,
    );
    Ok(())
}

pub async fn cleanup(opts: &GlobalOptions) -> Result<()> {
    let mut updater = board_updater(opts.update_config()?)?;
    updater.cleanup().await;
    output::print_success("Cleanup complete", json!({}), opts.json);
    Ok(())
}

pub async fn reboot(opts: &GlobalOptions, yes: bool) -> Result<()> {
    confirm("Reboot now", yes)?;
    let updater = board_updater(opts.update_config()?)?;
    updater.reboot_system().await?;
    Ok(())
}
