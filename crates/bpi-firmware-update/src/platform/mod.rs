//! Operating-system boundary
//!
//! Every privileged interaction with the board (running the filesystem
//! tools, mounting, raw boot block copies, rebooting) goes through
//! [`Platform`]. The updater never builds shell strings: each external
//! command is a [`SystemCommand`] variant that renders to a fixed argument
//! vector.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::boot_switch::copy_blocks;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform;

/// Filesystems the updater creates and mounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filesystem {
    /// ext4, used for the staging area and root filesystems
    Ext4,
    /// FAT32, used for kernel partitions
    Vfat32,
}

impl Filesystem {
    /// Filesystem type name passed to mount(2)
    pub const fn mount_type(self) -> &'static str {
        match self {
            Filesystem::Ext4 => "ext4",
            Filesystem::Vfat32 => "vfat",
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mount_type())
    }
}

/// External commands run by the updater
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand {
    /// Create a filesystem on a block device, destroying its contents
    MakeFilesystem {
        /// Block device
        device: PathBuf,
        /// Filesystem to create
        filesystem: Filesystem,
        /// Volume label (ext4 only)
        label: Option<String>,
    },

    /// Read-only loop mount of a partition inside a disk image
    LoopMount {
        /// Disk image
        image: PathBuf,
        /// Byte offset of the partition
        offset: u64,
        /// Mount point
        target: PathBuf,
    },

    /// Make `destination` an exact copy of the contents of `source`
    Mirror {
        /// Source directory
        source: PathBuf,
        /// Destination directory
        destination: PathBuf,
    },
}

impl SystemCommand {
    /// Program name
    pub fn program(&self) -> &'static str {
        match self {
            SystemCommand::MakeFilesystem {
                filesystem: Filesystem::Ext4,
                ..
            } => "mkfs.ext4",
            SystemCommand::MakeFilesystem {
                filesystem: Filesystem::Vfat32,
                ..
            } => "mkfs.vfat",
            SystemCommand::LoopMount { .. } => "mount",
            SystemCommand::Mirror { .. } => "rsync",
        }
    }

    /// Arguments following the program name
    pub fn args(&self) -> Vec<OsString> {
        match self {
            SystemCommand::MakeFilesystem {
                device,
                filesystem: Filesystem::Ext4,
                label,
            } => {
                let mut args = vec![OsString::from("-F"), device.clone().into_os_string()];
                if let Some(label) = label {
                    args.push(OsString::from("-L"));
                    args.push(OsString::from(label));
                }
                args
            }
            SystemCommand::MakeFilesystem {
                device,
                filesystem: Filesystem::Vfat32,
                ..
            } => vec![
                OsString::from("-F"),
                OsString::from("32"),
                device.clone().into_os_string(),
            ],
            SystemCommand::LoopMount {
                image,
                offset,
                target,
            } => vec![
                OsString::from("-o"),
                OsString::from(format!("loop,offset={offset},ro")),
                image.clone().into_os_string(),
                target.clone().into_os_string(),
            ],
            SystemCommand::Mirror {
                source,
                destination,
            } => vec![
                OsString::from("-a"),
                OsString::from("--delete"),
                with_trailing_slash(source),
                with_trailing_slash(destination),
            ],
        }
    }

    /// Full argument vector, program first
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv = vec![OsString::from(self.program())];
        argv.extend(self.args());
        argv
    }
}

impl fmt::Display for SystemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())?;
        for arg in self.args() {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn with_trailing_slash(path: &Path) -> OsString {
    let mut rendered = path.as_os_str().to_owned();
    if !rendered.to_string_lossy().ends_with('/') {
        rendered.push("/");
    }
    rendered
}

/// A block device mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMount {
    /// Block device
    pub device: PathBuf,
    /// Mount point
    pub target: PathBuf,
    /// Filesystem on the device
    pub filesystem: Filesystem,
}

/// Environment and limits for external commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// `PATH` for child processes; inherited when `None`
    pub search_path: Option<OsString>,
    /// `LD_LIBRARY_PATH` for child processes; inherited when `None`
    pub library_path: Option<OsString>,
    /// Kill the child after this long
    pub timeout: Option<Duration>,
}

/// Failure of a single platform operation
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The program exited with a non-zero status
    #[error("{program} exited with status {code}")]
    ExitStatus {
        /// Program name
        program: String,
        /// Exit code
        code: i32,
    },

    /// The program was killed by a signal
    #[error("{program} terminated by signal {signal}")]
    Signaled {
        /// Program name
        program: String,
        /// Signal number, if known
        signal: i32,
    },

    /// The program ran past the configured timeout and was killed
    #[error("{program} timed out after {after:?}")]
    TimedOut {
        /// Program name
        program: String,
        /// Configured timeout
        after: Duration,
    },

    /// A direct system call failed
    #[error("{operation} {target} failed: {source}")]
    Syscall {
        /// Operation name
        operation: &'static str,
        /// Path the operation applied to
        target: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Build a [`CommandError::Syscall`]
    pub fn syscall(operation: &'static str, target: &Path, source: std::io::Error) -> Self {
        CommandError::Syscall {
            operation,
            target: target.display().to_string(),
            source,
        }
    }
}

/// Privileged operating-system operations
#[async_trait]
pub trait Platform: Send + Sync {
    /// Run an external command to completion
    async fn execute(
        &self,
        command: &SystemCommand,
        options: &ExecOptions,
    ) -> Result<(), CommandError>;

    /// Mount a block device
    async fn mount(&self, mount: &BlockMount) -> Result<(), CommandError>;

    /// Unmount a mount point
    async fn unmount(&self, target: &Path) -> Result<(), CommandError>;

    /// Unmount every mount point of a block device
    async fn unmount_device(&self, device: &Path) -> Result<(), CommandError>;

    /// Flush filesystem buffers
    async fn sync(&self) -> Result<(), CommandError>;

    /// Restart the system; returns only on failure
    async fn reboot(&self) -> Result<(), CommandError>;

    /// Copy a raw boot block image, flushing the destination to stable
    /// storage when `write_through` is set. Returns the bytes copied.
    async fn copy_blocks(
        &self,
        source: &Path,
        destination: &Path,
        write_through: bool,
    ) -> Result<u64, CommandError> {
        let (from, to) = (source.to_path_buf(), destination.to_path_buf());
        tokio::task::spawn_blocking(move || copy_blocks(&from, &to, write_through))
            .await
            .map_err(std::io::Error::other)
            .and_then(std::convert::identity)
            .map_err(|e| CommandError::syscall("copy", destination, e))
    }
}

/// Mount points of `device` in a `/proc/self/mounts` table, most recent last
pub fn mount_points_of(table: &str, device: &Path) -> Vec<PathBuf> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            (Path::new(&unescape_mount_field(source)) == device)
                .then(|| PathBuf::from(unescape_mount_field(target)))
        })
        .collect()
}

/// Decode the octal escapes (`\040` for space) used in the mount table
fn unescape_mount_field(field: &str) -> String {
    let mut out = Vec::with_capacity(field.len());
    let mut rest = field.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        rest = tail;
        if byte == b'\\'
            && let Some(decoded) = octal_escape(tail)
        {
            out.push(decoded);
            rest = tail.get(3..).unwrap_or_default();
            continue;
        }
        out.push(byte);
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Value of a three-digit octal escape at the start of `bytes`
fn octal_escape(bytes: &[u8]) -> Option<u8> {
    let value = bytes.get(..3)?.iter().try_fold(0u32, |acc, d| {
        char::from(*d)
            .to_digit(8)
            .map(|digit| acc.wrapping_shl(3) | digit)
    })?;
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(command: &SystemCommand) -> Vec<String> {
        command
            .argv()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_mkfs_ext4_argv() {
        let command = SystemCommand::MakeFilesystem {
            device: PathBuf::from("/dev/mmcblk0p16"),
            filesystem: Filesystem::Ext4,
            label: Some("staging".to_string()),
        };
        assert_eq!(
            rendered(&command),
            vec!["mkfs.ext4", "-F", "/dev/mmcblk0p16", "-L", "staging"]
        );
    }

    #[test]
    fn test_mkfs_ext4_without_label() {
        let command = SystemCommand::MakeFilesystem {
            device: PathBuf::from("/dev/mmcblk0p8"),
            filesystem: Filesystem::Ext4,
            label: None,
        };
        assert_eq!(command.to_string(), "mkfs.ext4 -F /dev/mmcblk0p8");
    }

    #[test]
    fn test_mkfs_vfat_argv() {
        let command = SystemCommand::MakeFilesystem {
            device: PathBuf::from("/dev/mmcblk0p7"),
            filesystem: Filesystem::Vfat32,
            label: Some("ignored".to_string()),
        };
        assert_eq!(
            rendered(&command),
            vec!["mkfs.vfat", "-F", "32", "/dev/mmcblk0p7"]
        );
    }

    #[test]
    fn test_loop_mount_argv() {
        let command = SystemCommand::LoopMount {
            image: PathBuf::from("/tmp/firmware.bin.wic"),
            offset: 1_048_576,
            target: PathBuf::from("/extblock/kernel_from_image"),
        };
        assert_eq!(
            command.to_string(),
            "mount -o loop,offset=1048576,ro /tmp/firmware.bin.wic /extblock/kernel_from_image"
        );
    }

    #[test]
    fn test_mirror_adds_trailing_slashes_once() {
        let command = SystemCommand::Mirror {
            source: PathBuf::from("/tmp/rootfs_from_image"),
            destination: PathBuf::from("/mnt/rootfs_b/"),
        };
        assert_eq!(
            rendered(&command),
            vec!["rsync", "-a", "--delete", "/tmp/rootfs_from_image/", "/mnt/rootfs_b/"]
        );
    }

    #[test]
    fn test_mount_points_of_device() {
        let table = "\
/dev/root / ext4 rw,relatime 0 0
/dev/mmcblk0p7 /mnt/boot_b vfat rw 0 0
tmpfs /tmp tmpfs rw 0 0
/dev/mmcblk0p7 /media/boot\\040b vfat ro 0 0
";
        assert_eq!(
            mount_points_of(table, Path::new("/dev/mmcblk0p7")),
            vec![PathBuf::from("/mnt/boot_b"), PathBuf::from("/media/boot b")]
        );
        assert!(mount_points_of(table, Path::new("/dev/mmcblk0p8")).is_empty());
    }

    #[test]
    fn test_unescape_keeps_malformed_escape() {
        assert_eq!(unescape_mount_field("a\\04"), "a\\04");
        assert_eq!(unescape_mount_field("tab\\011x"), "tab\tx");
    }

    #[test]
    fn test_unescape_multibyte_utf8() {
        assert_eq!(unescape_mount_field("/media/caf\\303\\251"), "/media/café");
        assert_eq!(unescape_mount_field("x\\777"), "x\\777");
    }
}
