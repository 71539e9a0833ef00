//! Boot block switch
//!
//! After a verified update the alternate BL2/FIP slots hold the boot chain for
//! the freshly written bank. Switching copies them over the primary slots and
//! keeps the previous primaries in the alternate slots as the fallback.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::FirmwareUpdateError;
use crate::updater::FirmwareUpdater;

/// Block size of raw boot block copies
pub const BLOCK_SIZE: usize = 512;

const BLOCKS_PER_CHUNK: usize = 128;

/// Progress of the boot switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootSwitchState {
    /// Nothing touched
    NotSwitched,
    /// Primary slots copied to the backup files
    BackedUp,
    /// Alternate slots copied over the primary slots
    Switched,
    /// Previous primaries restored into the alternate slots
    Mirrored,
}

impl std::fmt::Display for BootSwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootSwitchState::NotSwitched => write!(f, "not-switched"),
            BootSwitchState::BackedUp => write!(f, "backed-up"),
            BootSwitchState::Switched => write!(f, "switched"),
            BootSwitchState::Mirrored => write!(f, "mirrored"),
        }
    }
}

/// Copy `source` to `destination` in [`BLOCK_SIZE`] blocks.
///
/// With `write_through`, the destination is flushed to stable storage before
/// returning. Returns the number of bytes copied.
pub fn copy_blocks(
    source: &Path,
    destination: &Path,
    write_through: bool,
) -> std::io::Result<u64> {
    let mut input = File::open(source)?;
    let mut output = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)?;

    let mut buffer = vec![0u8; BLOCK_SIZE * BLOCKS_PER_CHUNK];
    let mut copied: u64 = 0;
    loop {
        let read = input.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).unwrap_or_default();
        output.write_all(chunk)?;
        copied = copied.saturating_add(read as u64);
    }

    output.flush()?;
    if write_through {
        output.sync_all()?;
    }
    Ok(copied)
}

impl FirmwareUpdater {
    /// Switch the boot blocks to the alternate slots when `enable` is set.
    ///
    /// With `enable == false` nothing is touched and the state stays
    /// [`BootSwitchState::NotSwitched`]. On failure the error names the state
    /// that had been reached; a failure after
    /// [`BootSwitchState::BackedUp`] may leave the board unbootable.
    pub async fn perform_boot_switch(
        &self,
        enable: bool,
    ) -> Result<BootSwitchState, FirmwareUpdateError> {
        let blocks = self.require_config()?.boot_blocks.clone();
        if !enable {
            info!("boot switch disabled");
            return Ok(BootSwitchState::NotSwitched);
        }

        let steps: [(BootSwitchState, [(PathBuf, PathBuf); 2], bool); 3] = [
            (
                BootSwitchState::BackedUp,
                [
                    (blocks.bl2_primary.clone(), blocks.bl2_backup.clone()),
                    (blocks.fip_primary.clone(), blocks.fip_backup.clone()),
                ],
                false,
            ),
            (
                BootSwitchState::Switched,
                [
                    (blocks.bl2_alternate.clone(), blocks.bl2_primary.clone()),
                    (blocks.fip_alternate.clone(), blocks.fip_primary.clone()),
                ],
                true,
            ),
            (
                BootSwitchState::Mirrored,
                [
                    (blocks.bl2_backup, blocks.bl2_alternate),
                    (blocks.fip_backup, blocks.fip_alternate),
                ],
                true,
            ),
        ];

        let mut state = BootSwitchState::NotSwitched;
        for (next, copies, write_through) in steps {
            for (source, destination) in copies {
                let copied = self
                    .platform
                    .copy_blocks(&source, &destination, write_through)
                    .await;
                if let Err(e) = copied {
                    error!(
                        state = %state,
                        source = %source.display(),
                        destination = %destination.display(),
                        error = %e,
                        "boot switch failed"
                    );
                    return Err(FirmwareUpdateError::system(format!(
                        "copy {} -> {} failed in state {state}: {e}",
                        source.display(),
                        destination.display()
                    )));
                }
            }
            state = next;
            info!(state = %state, "boot switch progressed");
        }

        Ok(state)
    }
}
