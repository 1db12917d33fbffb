//! `scan` subcommand — list nearby BLE peripherals.

use std::path::Path;
use std::time::Duration;

use super::{BleCentral, Result, ScanOutput, print_json};

pub(super) fn cmd_scan(secs: Option<u64>, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path);
    let duration = secs.map(Duration::from_secs).unwrap_or(config.scan_timeout());

    if !json {
        println!("Scanning for {}s...", duration.as_secs());
    }
    let central = BleCentral::open()?;
    let devices = central.scan(duration, &config.device_name)?;

    if json {
        return print_json(&ScanOutput {
            count: devices.len(),
            devices,
        });
    }

    if devices.is_empty() {
        println!("No BLE peripherals found.");
        return Ok(());
    }
    let name_w = devices
        .iter()
        .map(|d| d.name.len())
        .max()
        .unwrap_or(0)
        .max("(unnamed)".len());
    for d in &devices {
        let name = if d.name.is_empty() { "(unnamed)" } else { &d.name };
        let rssi = d
            .rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "-".into());
        let marker = if d.is_controller { "  <- controller" } else { "" };
        println!("  {name:<name_w$}  {}  {rssi:>8}{marker}", d.address);
    }
    Ok(())
}
