//! Read-only commands

use std::path::Path;

use anyhow::Result;
use bpi_firmware_update::prelude::*;
use bpi_firmware_update::wic::{PartitionTableError, read_partition_table};
use serde_json::json;

use crate::commands::{GlobalOptions, board_updater};
use crate::output;

pub async fn bank_info(opts: &GlobalOptions) -> Result<()> {
    let updater = board_updater(opts.update_config()?)?;
    let info = updater.get_bank_info().await?;
    output::print_bank_info(&info, opts.json);
    Ok(())
}

pub fn wic_offset(opts: &GlobalOptions, image: &Path, index: u32) -> Result<()> {
    let Some(offset) = get_wic_partition_offset(image, index) else {
        return Err(FirmwareUpdateError::PartitionFailed(format!(
            "no partition {index} in {}",
            image.display()
        ))
        .into());
    };

    if opts.json {
        output::print_success(
            &format!("Partition {index} found"),
            json!({ "index": index, "offset": offset }),
            true,
        );
    } else {
        println!("{}", offset);
    }
    Ok(())
}

pub fn partitions(opts: &GlobalOptions, image: &Path) -> Result<()> {
    let entries = read_partition_table(image).map_err(|e| match e {
        PartitionTableError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            FirmwareUpdateError::FileNotFound(image.display().to_string())
        }
        other => FirmwareUpdateError::PartitionFailed(format!("{}: {other}", image.display())),
    })?;
    output::print_partitions(&entries, opts.json);
    Ok(())
}

pub fn errors(opts: &GlobalOptions) -> Result<()> {
    output::print_error_table(opts.json);
    Ok(())
}
