//! `send` subcommand — write one LED color command to the controller.

use std::path::Path;

use gltch_lib::dispatch::command_for;
use gltch_lib::protocol::Frame;
use gltch_lib::transport::FrameSink;

use super::{BleCentral, GltchError, Result, led, protocol};

/// Resolve a palette color (a name or `#RRGGBB`) or a raw hex frame.
fn resolve_target(target: &str) -> Result<Frame> {
    let target = target.trim();
    let is_color = target.starts_with('#') || target.chars().all(|c| c.is_ascii_alphabetic());
    if !is_color {
        return protocol::parse_frame_hex(target).map_err(GltchError::Input);
    }
    let color = led::parse_color(target)?;
    command_for(color)
        .ok_or_else(|| GltchError::Color(format!("{color} is not one of white, green, red, black")))
}

pub(super) fn cmd_send(target: &str, config_path: Option<&Path>) -> Result<()> {
    let frame = resolve_target(target)?;
    let config = super::load_valid_config(config_path)?;

    let central = BleCentral::open()?;
    println!("[link] looking for {}...", config.device_name);
    let link = central.connect(&config.device_name, config.scan_timeout())?;
    let result = link.send(frame.to_bytes());
    link.disconnect();
    result?;

    println!("Sent {frame} to {}", link.address());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_names_resolve() {
        assert_eq!(resolve_target("green").unwrap(), Frame::new(0xFE, 0x02));
        assert_eq!(resolve_target("BLACK").unwrap(), Frame::new(0xFE, 0x04));
        assert_eq!(resolve_target("#FF2020").unwrap(), Frame::new(0xFE, 0x03));
    }

    #[test]
    fn off_palette_color_rejected() {
        let err = resolve_target("#123456").unwrap_err();
        assert!(err.to_string().contains("#123456"));
        assert!(resolve_target("purple").is_err());
    }

    #[test]
    fn raw_frames_pass_through() {
        assert_eq!(resolve_target("00 FE 01").unwrap(), Frame::new(0xFE, 0x01));
        assert_eq!(resolve_target("00 BD 03").unwrap(), Frame::new(0xBD, 0x03));
        assert_eq!(resolve_target("00fe04").unwrap(), Frame::new(0xFE, 0x04));
        assert!(resolve_target("00 FE").is_err());
    }
}
