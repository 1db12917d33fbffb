//! Controller-side dispatch of inbound frames to indicator colors.

use std::fmt;

use crate::led::{Color, ColorQueue};
use crate::protocol::{self, CLASS_STATUS, Frame, FrameError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// Well-formed frame with a class/opcode this side does not handle.
    UnknownCommand(u8),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownCommand(op) => {
                write!(f, "corrupted payload: command 0x{op:02X}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Map a frame to the color it commands.
///
/// Only the status class carries color commands; request frames (and any
/// other class) are rejected with the frame's opcode.
pub fn dispatch(frame: Frame) -> Result<Color, DispatchError> {
    if frame.class != CLASS_STATUS {
        return Err(DispatchError::UnknownCommand(frame.opcode));
    }
    match frame.opcode {
        0x01 => Ok(Color::WHITE),
        0x02 => Ok(Color::GREEN),
        0x03 => Ok(Color::RED),
        0x04 => Ok(Color::BLACK),
        op => Err(DispatchError::UnknownCommand(op)),
    }
}

/// The color-command frame for one of the four palette colors.
pub fn command_for(color: Color) -> Option<Frame> {
    let opcode = match color {
        Color::WHITE => 0x01,
        Color::GREEN => 0x02,
        Color::RED => 0x03,
        Color::BLACK => 0x04,
        _ => return None,
    };
    Some(Frame::new(CLASS_STATUS, opcode))
}

/// Why an inbound write was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Characteristic write at a non-zero offset.
    Offset(usize),
    Frame(FrameError),
    Dispatch(DispatchError),
    /// The indicator worker is gone.
    QueueClosed,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::Offset(o) => write!(f, "corrupted payload: offset {o}"),
            Rejected::Frame(e) => write!(f, "{e}"),
            Rejected::Dispatch(e) => write!(f, "{e}"),
            Rejected::QueueClosed => write!(f, "indicator pipeline stopped"),
        }
    }
}

/// Validates characteristic writes and feeds the indicator pipeline.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    queue: ColorQueue,
}

impl Dispatcher {
    pub fn new(queue: ColorQueue) -> Self {
        Dispatcher { queue }
    }

    /// Handle one characteristic write.
    ///
    /// Malformed or unknown input is logged and dropped; nothing is enqueued.
    /// Blocks if the indicator queue is full.
    pub fn handle_write(&self, offset: usize, value: &[u8]) -> Result<Color, Rejected> {
        log::debug!("[dispatch] received {} bytes: {value:02X?}", value.len());
        let result = self.resolve(offset, value).and_then(|color| {
            self.queue
                .push(color)
                .map(|()| color)
                .map_err(|_| Rejected::QueueClosed)
        });
        if let Err(ref e) = result {
            log::warn!("[dispatch] {e}");
        }
        result
    }

    fn resolve(&self, offset: usize, value: &[u8]) -> Result<Color, Rejected> {
        if offset != 0 {
            return Err(Rejected::Offset(offset));
        }
        let frame = protocol::decode(value).map_err(Rejected::Frame)?;
        dispatch(frame).map_err(Rejected::Dispatch)
    }
}
