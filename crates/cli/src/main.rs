//! bpifwctl - BPI firmware update control
//!
//! Runs the A/B bank update pipeline, or any single stage of it, on a BPI
//! board, and inspects disk images and bank layout.

#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::stage::Partition;
use crate::commands::{Commands, GlobalOptions};

#[derive(Parser)]
#[command(name = "bpifwctl")]
#[command(about = "BPI firmware update control - A/B bank updates for BPI boards")]
#[command(version)]
#[command(long_about = "
bpifwctl writes a firmware image to the inactive (passive) bank of a BPI
board, verifies the written kernel and switches the boot blocks so the next
boot comes up on the new bank.

Every pipeline stage is also available as its own command.
Use --json flag for machine-readable output suitable for scripting.
Exit status is 0 on success, or the failing stage's error code (see `errors`).
")]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("bpifwctl={log_level},bpi_firmware_update={log_level}").into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match execute_command(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.global.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }
            ExitCode::from(error::exit_code(&e))
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    let opts = &cli.global;
    match &cli.command {
        Commands::Update {
            location,
            reboot,
            yes,
        } => commands::update::execute(opts, location, *reboot, *yes).await,
        Commands::BankInfo => commands::inspect::bank_info(opts).await,
        Commands::WicOffset { image, index } => commands::inspect::wic_offset(opts, image, *index),
        Commands::Partitions { image } => commands::inspect::partitions(opts, image),
        Commands::Staging { yes } => commands::stage::staging(opts, *yes).await,
        Commands::Download { location } => commands::stage::download(opts, location).await,
        Commands::Decompress => commands::stage::decompress(opts).await,
        Commands::WriteKernel { yes } => {
            commands::stage::write(opts, Partition::Kernel, *yes).await
        }
        Commands::WriteRootfs { yes } => {
            commands::stage::write(opts, Partition::Rootfs, *yes).await
        }
        Commands::Verify => commands::stage::verify(opts).await,
        Commands::BootSwitch { enable, yes } => {
            commands::stage::boot_switch(opts, *enable, *yes).await
        }
        Commands::Errors => commands::inspect::errors(opts),
        Commands::Cleanup => commands::stage::cleanup(opts).await,
        Commands::Reboot { yes } => commands::stage::reboot(opts, *yes).await,
    }
}
