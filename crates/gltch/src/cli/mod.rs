//! CLI subcommands for the companion binary.

mod companion;
mod config_cmd;
mod mute;
mod scan;
mod send;
mod simulate;

use std::path::Path;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use gltch_lib::GltchError;
pub(super) use gltch_lib::audio;
pub(super) use gltch_lib::ble::{BleCentral, DiscoveredDevice};
pub(super) use gltch_lib::config::Config;
pub(super) use gltch_lib::error::Result;
pub(super) use gltch_lib::led;
pub(super) use gltch_lib::protocol;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| GltchError::Io(std::io::Error::other(e)))?;
    println!("{text}");
    Ok(())
}

/// Load the config from `custom_path` (or the platform default), logging
/// parse warnings.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    match custom_path {
        Some(path) => {
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

/// Like [`load_config`], but an invalid config is an error.
pub(super) fn load_valid_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = load_config(custom_path);
    if let Err(errors) = config.validate() {
        let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(GltchError::Config(joined.join("; ")));
    }
    Ok(config)
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct ScanOutput {
    pub count: usize,
    pub devices: Vec<DiscoveredDevice>,
}

#[derive(Serialize)]
pub(super) struct VolumeOutput {
    pub level: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect to the controller and run the mute episode loop
    Companion,

    /// List nearby BLE peripherals
    Scan {
        /// Scan duration in seconds (default: scan_secs from config)
        #[arg(long)]
        secs: Option<u64>,
    },

    /// Write one LED color command to the controller
    Send {
        /// white, green, red, black, or a raw frame such as "00 FE 02"
        target: String,
    },

    /// Run the controller core locally, driven by stdin
    Simulate,

    /// Set the input volume to the configured mute level
    Mute,

    /// Set the input volume to the configured restore level
    Unmute,

    /// Show the current input volume
    Volume,

    /// Show the effective configuration and file path
    Config {
        /// Write a default config file if none exists yet
        #[arg(long)]
        init: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Companion => {
            if json {
                warn_json_unsupported("companion");
            }
            companion::cmd_companion(config_path)
        }
        Command::Scan { secs } => scan::cmd_scan(secs, json, config_path),
        Command::Send { target } => {
            if json {
                warn_json_unsupported("send");
            }
            send::cmd_send(&target, config_path)
        }
        Command::Simulate => {
            if json {
                warn_json_unsupported("simulate");
            }
            simulate::cmd_simulate()
        }
        Command::Mute => {
            if json {
                warn_json_unsupported("mute");
            }
            mute::cmd_set_level(mute::LevelAction::Mute, config_path)
        }
        Command::Unmute => {
            if json {
                warn_json_unsupported("unmute");
            }
            mute::cmd_set_level(mute::LevelAction::Restore, config_path)
        }
        Command::Volume => mute::cmd_volume(json),
        Command::Config { init: true } => {
            if json {
                warn_json_unsupported("config --init");
            }
            config_cmd::cmd_init(config_path)
        }
        Command::Config { init: false } => config_cmd::cmd_config(json, config_path),
    }
}
