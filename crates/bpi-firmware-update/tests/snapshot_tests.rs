//! Snapshot tests for user-visible strings.
//!
//! Error descriptions and command lines are read by operators and scripts;
//! these tests keep them stable.

use bpi_firmware_update::prelude::*;
use bpi_firmware_update::{Filesystem, SystemCommand};
use std::path::PathBuf;

mod error_string_snapshots {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_all_error_strings() {
        let table: Vec<String> = std::iter::once(0)
            .chain(ErrorKind::ALL.iter().map(|k| k.code()))
            .chain(std::iter::once(-99))
            .map(|code| format!("{code} {}", error_string(code)))
            .collect();
        assert_snapshot!(table.join("\n"), @r"
        0 Success
        -1 Invalid parameter
        -2 File not found
        -3 Mount operation failed
        -4 Download failed
        -5 Decompression failed
        -6 Partition operation failed
        -7 Kernel checksum mismatch
        -8 System command failed
        -9 Bank detection failed
        -99 Unknown error
        ");
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = FirmwareUpdateError::ChecksumMismatch {
            expected: "9f86d081".to_string(),
            written: "60303ae2".to_string(),
        };
        assert_snapshot!(
            err.to_string(),
            @"Checksum mismatch: expected 9f86d081, written 60303ae2"
        );
    }

    #[test]
    fn test_mount_failed_display() {
        let err = FirmwareUpdateError::MountFailed("/mnt/boot_b: EBUSY".to_string());
        assert_snapshot!(err.to_string(), @"Mount operation failed: /mnt/boot_b: EBUSY");
    }
}

mod command_snapshots {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_kernel_partition_commands() {
        let commands = [
            SystemCommand::LoopMount {
                image: PathBuf::from("/tmp/firmware.bin.wic"),
                offset: 71_303_168,
                target: PathBuf::from("/extblock/kernel_from_image"),
            },
            SystemCommand::MakeFilesystem {
                device: PathBuf::from("/dev/mmcblk0p7"),
                filesystem: Filesystem::Vfat32,
                label: None,
            },
            SystemCommand::Mirror {
                source: PathBuf::from("/extblock/kernel_from_image"),
                destination: PathBuf::from("/mnt/boot_b"),
            },
        ];
        let rendered: Vec<String> = commands.iter().map(ToString::to_string).collect();
        assert_snapshot!(rendered.join("\n"), @r"
        mount -o loop,offset=71303168,ro /tmp/firmware.bin.wic /extblock/kernel_from_image
        mkfs.vfat -F 32 /dev/mmcblk0p7
        rsync -a --delete /extblock/kernel_from_image/ /mnt/boot_b/
        ");
    }

    #[test]
    fn test_staging_format_command() {
        let command = SystemCommand::MakeFilesystem {
            device: PathBuf::from("/dev/mmcblk0p16"),
            filesystem: Filesystem::Ext4,
            label: Some("staging".to_string()),
        };
        assert_snapshot!(command.to_string(), @"mkfs.ext4 -F /dev/mmcblk0p16 -L staging");
    }
}
