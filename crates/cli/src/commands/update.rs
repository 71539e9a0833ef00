//! Full update pipeline

use anyhow::Result;
use bpi_firmware_update::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::commands::{GlobalOptions, board_updater, confirm};
use crate::error::CliError;
use crate::output;

/// Run download to boot switch, then clean up and optionally reboot
pub async fn execute(opts: &GlobalOptions, location: &str, reboot: bool, yes: bool) -> Result<()> {
    confirm(
        &format!("Write firmware from {location} to the passive bank"),
        yes,
    )?;

    let mut config = opts.update_config()?;
    let bar = if opts.json {
        None
    } else {
        Some(progress_bar()?)
    };
    if let Some(bar) = bar.clone() {
        config = config.with_progress(move |progress| {
            bar.set_position(u64::from(progress.percent));
            bar.set_message(format!("[{}] {}", progress.stage, progress.message));
        });
    }

    let mut updater = board_updater(config)?;
    let result = updater.update_firmware(location).await;
    updater.cleanup().await;

    if let Some(bar) = &bar {
        match &result {
            Ok(_) => bar.finish_with_message("done"),
            Err(_) => bar.abandon(),
        }
    }

    let report = result?;
    output::print_report(&report, opts.json);

    if reboot {
        if report.boot_switch != BootSwitchState::Mirrored {
            warn!(state = %report.boot_switch, "reboot requested but boot blocks not switched");
            return Err(CliError::NotSwitched(report.boot_switch.to_string()).into());
        }
        updater.reboot_system().await?;
    }
    Ok(())
}

fn progress_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}
