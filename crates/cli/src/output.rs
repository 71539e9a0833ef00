//! Output formatting for CLI responses

use anyhow::Error;
use bpi_firmware_update::prelude::*;
use bpi_firmware_update::wic::{EntryKind, PartitionEntry};
use colored::*;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{error_type_name, exit_code, library_code};

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format output as JSON: {}", e),
    }
}

fn to_value(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    print_json(&error_json(error));
}

/// `code` is the updater's error code and stays `null` for CLI failures
fn error_json(error: &Error) -> Value {
    json!({
        "success": false,
        "error": {
            "message": format!("{:#}", error),
            "type": error_type_name(error),
            "code": library_code(error),
            "exit_code": exit_code(error),
        }
    })
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

/// Print a one-line success message, or `{"success": true, ...data}`
pub fn print_success(message: &str, data: Value, json: bool) {
    if json {
        let mut output = json!({ "success": true, "message": message });
        if let (Some(target), Value::Object(extra)) = (output.as_object_mut(), data) {
            target.extend(extra);
        }
        print_json(&output);
    } else {
        println!("{} {}", "✓".green(), message);
    }
}

/// Print the bank layout
pub fn print_bank_info(info: &BankInfo, json: bool) {
    if json {
        print_json(&json!({ "success": true, "bank": to_value(info) }));
        return;
    }

    println!("{}", "Bank Layout:".bold());
    println!("  Active bank:  {}", info.active_bank.to_string().green().bold());
    println!("  Passive bank: {}", info.passive_bank().to_string().cyan());
    println!(
        "  Kernel: {} (image partition {} at {:#x})",
        info.passive_kernel.display(),
        info.passive_kernel_partition_index,
        info.passive_kernel_offset
    );
    println!(
        "  Rootfs: {} (image partition {} at {:#x})",
        info.passive_rootfs.display(),
        info.passive_rootfs_partition_index,
        info.passive_rootfs_offset
    );
}

/// Print a partition listing
pub fn print_partitions(entries: &[PartitionEntry], json: bool) {
    if json {
        print_json(&json!({ "success": true, "partitions": to_value(&entries) }));
        return;
    }

    if entries.is_empty() {
        println!("{}", "No partitions found".yellow());
        return;
    }

    println!(
        "{}",
        format!(
            "{:>3}  {:<8}  {:>12}  {:>12}  {:>14}",
            "#", "Kind", "Start", "Sectors", "Offset"
        )
        .bold()
    );
    for entry in entries {
        let kind = match entry.kind {
            EntryKind::Primary => "primary",
            EntryKind::Extended => "extended",
            EntryKind::Logical => "logical",
            EntryKind::Gpt => "gpt",
        };
        let line = format!(
            "{:>3}  {:<8}  {:>12}  {:>12}  {:>14}",
            entry.number,
            kind,
            entry.start_sector,
            entry.sector_count,
            entry.offset_bytes()
        );
        if entry.kind == EntryKind::Extended {
            println!("{}", line.dimmed());
        } else {
            println!("{}", line);
        }
    }
}

/// Print the outcome of a full update run
pub fn print_report(report: &UpdateReport, json: bool) {
    if json {
        print_json(&json!({ "success": true, "report": to_value(report) }));
        return;
    }

    println!(
        "{} Bank {} written (active bank {})",
        "✓".green(),
        report.bank.passive_bank().to_string().bold(),
        report.bank.active_bank
    );
    match &report.verification {
        Verification::Verified { checksum } => {
            println!("  Kernel verified: {}", checksum.dimmed());
        }
        Verification::Mismatch { expected, written } => {
            println!("  {} Kernel checksum mismatch", "⚠".yellow());
            println!("    expected: {}", expected);
            println!("    written:  {}", written);
        }
    }
    let state = report.boot_switch.to_string();
    let state = if report.boot_switch == BootSwitchState::Mirrored {
        state.green()
    } else {
        state.yellow()
    };
    println!("  Boot switch: {}", state);
}

/// Print the error code table
pub fn print_error_table(json: bool) {
    let codes: Vec<i32> = std::iter::once(0)
        .chain(ErrorKind::ALL.iter().map(|kind| kind.code()))
        .collect();

    if json {
        let table: Vec<Value> = codes
            .iter()
            .map(|&code| json!({ "code": code, "description": error_string(code) }))
            .collect();
        print_json(&json!({ "success": true, "errors": table }));
        return;
    }

    println!("{}", "Error Codes:".bold());
    for code in codes {
        println!("  {:>3}  {}", code, error_string(code));
    }
}
