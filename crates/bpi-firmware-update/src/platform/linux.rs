//! Linux implementation of [`Platform`]

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use nix::mount::{MsFlags, umount};
use nix::sys::reboot::{RebootMode, reboot};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{BlockMount, CommandError, ExecOptions, Platform, SystemCommand, mount_points_of};

const MOUNT_TABLE: &str = "/proc/self/mounts";

/// Runs commands with `tokio::process` and talks to the kernel through `nix`
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxPlatform;

impl LinuxPlatform {
    /// Create the platform handle
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Platform for LinuxPlatform {
    async fn execute(
        &self,
        command: &SystemCommand,
        options: &ExecOptions,
    ) -> Result<(), CommandError> {
        let program = command.program();
        debug!(command = %command, "running");

        let mut cmd = Command::new(program);
        cmd.args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = &options.search_path {
            cmd.env("PATH", path);
        }
        if let Some(path) = &options.library_path {
            cmd.env("LD_LIBRARY_PATH", path);
        }

        let child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let waited = match options.timeout {
            Some(after) => match timeout(after, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_elapsed) => {
                    return Err(CommandError::TimedOut {
                        program: program.to_string(),
                        after,
                    });
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!(program, stderr = %stderr.trim(), "command failed");
        }

        match output.status.code() {
            Some(code) => Err(CommandError::ExitStatus {
                program: program.to_string(),
                code,
            }),
            None => {
                use std::os::unix::process::ExitStatusExt;
                Err(CommandError::Signaled {
                    program: program.to_string(),
                    signal: output.status.signal().unwrap_or(-1),
                })
            }
        }
    }

    async fn mount(&self, mount: &BlockMount) -> Result<(), CommandError> {
        let device = mount.device.clone();
        let target = mount.target.clone();
        let fstype = mount.filesystem.mount_type();
        debug!(device = %device.display(), target = %target.display(), fstype, "mounting");

        blocking("mount", &mount.target, move || {
            nix::mount::mount(
                Some(device.as_path()),
                target.as_path(),
                Some(fstype),
                MsFlags::empty(),
                None::<&str>,
            )
        })
        .await
    }

    async fn unmount(&self, target: &Path) -> Result<(), CommandError> {
        let path = target.to_path_buf();
        debug!(target = %path.display(), "unmounting");
        blocking("umount", target, move || umount(path.as_path())).await
    }

    async fn unmount_device(&self, device: &Path) -> Result<(), CommandError> {
        let table = tokio::fs::read_to_string(MOUNT_TABLE)
            .await
            .map_err(|source| CommandError::syscall("read", Path::new(MOUNT_TABLE), source))?;

        let mut first_error = None;
        for target in mount_points_of(&table, device).into_iter().rev() {
            if let Err(e) = self.unmount(&target).await {
                warn!(device = %device.display(), error = %e, "could not unmount");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn sync(&self) -> Result<(), CommandError> {
        tokio::task::spawn_blocking(nix::unistd::sync)
            .await
            .map_err(|e| CommandError::syscall("sync", Path::new("/"), std::io::Error::other(e)))
    }

    async fn reboot(&self) -> Result<(), CommandError> {
        nix::unistd::sync();
        match reboot(RebootMode::RB_AUTOBOOT) {
            Ok(never) => match never {},
            Err(errno) => Err(CommandError::syscall(
                "reboot",
                Path::new("/"),
                std::io::Error::from(errno),
            )),
        }
    }
}

async fn blocking<F>(operation: &'static str, target: &Path, call: F) -> Result<(), CommandError>
where
    F: FnOnce() -> nix::Result<()> + Send + 'static,
{
    let target: PathBuf = target.to_path_buf();
    match tokio::task::spawn_blocking(call).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(errno)) => Err(CommandError::syscall(
            operation,
            &target,
            std::io::Error::from(errno),
        )),
        Err(join) => Err(CommandError::syscall(
            operation,
            &target,
            std::io::Error::other(join),
        )),
    }
}
