//! `config` subcommand — show the effective configuration and file path.

use std::path::Path;

use super::{Config, ConfigOutput, GltchError, Result, kv, kv_indent, kv_width, print_json};

/// Write the default configuration to `custom_path` (or the platform path).
///
/// An existing file is never replaced.
pub(super) fn cmd_init(custom_path: Option<&Path>) -> Result<()> {
    let path = custom_path
        .map(|p| p.to_path_buf())
        .or_else(Config::path)
        .ok_or_else(|| GltchError::Config("no config directory on this platform".into()))?;
    if path.exists() {
        return Err(GltchError::Config(format!(
            "{} already exists, not overwriting",
            path.display()
        )));
    }
    Config::default().save_to(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let problems: Vec<String> = match config.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };

    if json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            problems,
        });
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "device_name:",
            "scan_secs:",
            "on_mute_command:",
            "on_unmute_command:",
            "mute_level:",
            "restore_level:",
            "standby_after:",
            "recover_after:",
            "startup_grace:",
            "tick:",
            "confirm_policy:",
        ],
    );

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    let hook_label = |cmd: &str| {
        if cmd.trim().is_empty() {
            "(none)".to_string()
        } else {
            cmd.to_string()
        }
    };

    println!("Controller:");
    kv_indent("device_name:", &config.device_name, w);
    kv_indent("scan_secs:", config.scan_secs, w);
    kv_indent("on_mute_command:", hook_label(&config.on_mute_command), w);
    kv_indent("on_unmute_command:", hook_label(&config.on_unmute_command), w);
    println!();

    let ep = &config.episode;
    println!("Episode:");
    kv_indent("mute_level:", ep.mute_level, w);
    kv_indent("restore_level:", ep.restore_level, w);
    kv_indent("standby_after:", format_args!("{}s", ep.standby_after_secs), w);
    kv_indent("recover_after:", format_args!("{}s", ep.recover_after_secs), w);
    kv_indent("startup_grace:", format_args!("{}s", ep.startup_grace_secs), w);
    kv_indent("tick:", format_args!("{}ms", ep.tick_ms), w);
    kv_indent("confirm_policy:", ep.confirm_policy, w);

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  - {p}");
        }
    }
    Ok(())
}
