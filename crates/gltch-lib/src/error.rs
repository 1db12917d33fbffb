//! Unified error type for the gltch-lib crate.
//!
//! [`GltchError`] wraps the errors that reach a CLI command (`TransportError`,
//! `AudioError`, `BleError`, I/O) plus string-carrying kinds for config,
//! color and input parsing. Frame, dispatch and driver errors never escalate;
//! they are logged where they occur.
//! `From` impls let `?` cross module boundaries.

use std::fmt;

use crate::audio::AudioError;
use crate::ble::BleError;
use crate::transport::TransportError;

#[derive(Debug)]
pub enum GltchError {
    Transport(TransportError),
    /// Input-volume backend failure.
    Audio(AudioError),
    /// Bluetooth adapter, scan or GATT failure.
    Ble(BleError),
    Io(std::io::Error),
    Config(String),
    Color(String),
    /// Unparseable user input (hex frames, command arguments).
    Input(String),
}

impl fmt::Display for GltchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GltchError::Transport(e) => write!(f, "{e}"),
            GltchError::Audio(e) => write!(f, "{e}"),
            GltchError::Ble(e) => write!(f, "{e}"),
            GltchError::Io(e) => write!(f, "I/O error: {e}"),
            GltchError::Config(e) => write!(f, "Config error: {e}"),
            GltchError::Color(e) => write!(f, "Color error: {e}"),
            GltchError::Input(e) => write!(f, "Invalid input: {e}"),
        }
    }
}

impl std::error::Error for GltchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GltchError::Transport(e) => Some(e),
            GltchError::Audio(e) => Some(e),
            GltchError::Ble(e) => Some(e),
            GltchError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for GltchError {
    fn from(e: TransportError) -> Self {
        GltchError::Transport(e)
    }
}

impl From<AudioError> for GltchError {
    fn from(e: AudioError) -> Self {
        GltchError::Audio(e)
    }
}

impl From<BleError> for GltchError {
    fn from(e: BleError) -> Self {
        GltchError::Ble(e)
    }
}

impl From<std::io::Error> for GltchError {
    fn from(e: std::io::Error) -> Self {
        GltchError::Io(e)
    }
}

/// Crate-level Result alias using [`GltchError`].
pub type Result<T> = std::result::Result<T, GltchError>;
