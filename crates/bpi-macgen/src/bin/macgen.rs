//! Assign board MAC addresses from the serial number

use std::path::PathBuf;
use std::process::ExitCode;

use bpi_macgen::store::{DEFAULT_FLAG_FILE, DEFAULT_MAC_FILE};
use bpi_macgen::{DEFAULT_SERIAL_FILE, MacGenConfig, MacStore, Provisioned, provision};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bpi-macgen")]
#[command(about = "Derive interface MAC addresses from the board serial number")]
#[command(version)]
struct Args {
    /// File whose first line holds the serial number
    #[arg(long, default_value = DEFAULT_SERIAL_FILE)]
    serial_file: PathBuf,

    /// Address file to write
    #[arg(long, default_value = DEFAULT_MAC_FILE)]
    output: PathBuf,

    /// Flag file marking addresses as assigned
    #[arg(long, default_value = DEFAULT_FLAG_FILE)]
    flag_file: PathBuf,

    /// Do nothing if addresses were already assigned
    #[arg(long)]
    skip_if_assigned: bool,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("bpi_macgen={log_level}").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = MacGenConfig {
        serial_file: args.serial_file,
        store: MacStore {
            mac_file: args.output,
            flag_file: args.flag_file,
        },
        skip_if_assigned: args.skip_if_assigned,
    };

    match provision(&config) {
        Ok(Provisioned::AlreadyAssigned) => {
            println!("MAC addresses have already been assigned");
            ExitCode::SUCCESS
        }
        Ok(Provisioned::Generated {
            serial,
            assignments,
        }) => {
            println!("Read serial number: {}", serial);
            for assignment in &assignments {
                println!(
                    "Generated MAC address for {}: {}",
                    assignment.interface.name, assignment.mac
                );
            }
            println!("Wrote all MAC addresses to {}", config.store.mac_file.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
