//! `mute` / `unmute` / `volume` subcommands — OS input volume control.

use std::path::Path;

use super::audio::{self, InputVolume};
use super::{Result, VolumeOutput, print_json};

pub(super) enum LevelAction {
    Mute,
    Restore,
}

/// Apply the configured mute or restore level and verify it took effect.
///
/// Talks to the OS only; the controller ring is not updated.
pub(super) fn cmd_set_level(action: LevelAction, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_valid_config(config_path)?;
    let (level, label) = match action {
        LevelAction::Mute => (config.episode.mute_level, "MUTED"),
        LevelAction::Restore => (config.episode.restore_level, "RESTORED"),
    };

    let volume = audio::open_input_volume()?;
    audio::set_and_verify(&volume, level)?;
    println!("Microphone: {label} (input volume {level})");
    Ok(())
}

pub(super) fn cmd_volume(json: bool) -> Result<()> {
    let volume = audio::open_input_volume()?;
    let level = volume.get_input_volume()?;
    if json {
        return print_json(&VolumeOutput { level });
    }
    println!("Input volume: {level}");
    Ok(())
}
