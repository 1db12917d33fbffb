//! Gltch command protocol: 3-byte frames and BLE identifiers.
//!
//! Every frame is `[0x00, class, opcode]`. The class selects the frame family
//! (status/event or request); the opcode is family-specific. The same bytes
//! flow in both directions over a single GATT characteristic.

use std::fmt;

use uuid::Uuid;

/// Length of every frame on the wire.
pub const FRAME_LEN: usize = 3;

/// First byte of every well-formed frame.
pub const FRAME_PREFIX: u8 = 0x00;

// ── Frame classes ──

/// Status/event family (companion → controller, and LED color commands).
pub const CLASS_STATUS: u8 = 0xFE;
/// Request family (controller → companion).
pub const CLASS_REQUEST: u8 = 0xBD;

// ── Opcodes within CLASS_STATUS ──

pub const OP_CONNECTED: u8 = 0x01;
pub const OP_MUTE_CONFIRMED: u8 = 0x02;
pub const OP_MUTE_ENDED: u8 = 0x03;
pub const OP_ENTER_STANDBY: u8 = 0x04;

// ── Opcodes within CLASS_REQUEST ──

pub const OP_MUTE_REQUEST: u8 = 0x03;

// ── Catalogue ──

pub const CMD_CONNECTION_ESTABLISHED: [u8; FRAME_LEN] = encode(CLASS_STATUS, OP_CONNECTED);
pub const CMD_MUTE_CONFIRMED: [u8; FRAME_LEN] = encode(CLASS_STATUS, OP_MUTE_CONFIRMED);
pub const CMD_MUTE_ENDED: [u8; FRAME_LEN] = encode(CLASS_STATUS, OP_MUTE_ENDED);
pub const CMD_ENTER_STANDBY: [u8; FRAME_LEN] = encode(CLASS_STATUS, OP_ENTER_STANDBY);
pub const CMD_MUTE_REQUEST: [u8; FRAME_LEN] = encode(CLASS_REQUEST, OP_MUTE_REQUEST);
/// Initial characteristic value before anything is written.
pub const CMD_EMPTY: [u8; FRAME_LEN] = [0x00, 0x00, 0x00];

// ── BLE identifiers ──

/// Local name the controller advertises.
pub const DEVICE_NAME: &str = "Gltch Cntl";

/// GATT service hosting the command characteristic.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xa0b40001_926d_4d61_98df_8c5c62ee53b3);

/// Command characteristic (read, write, write-without-response, notify).
pub const COMMAND_CHAR_UUID: Uuid = Uuid::from_u128(0xa0b40002_926d_4d61_98df_8c5c62ee53b3);

/// A structurally valid frame. Class/opcode combinations are not checked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    pub class: u8,
    pub opcode: u8,
}

impl Frame {
    pub const fn new(class: u8, opcode: u8) -> Self {
        Frame { class, opcode }
    }

    pub const fn to_bytes(self) -> [u8; FRAME_LEN] {
        encode(self.class, self.opcode)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{FRAME_PREFIX:02X} {:02X} {:02X}", self.class, self.opcode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Byte sequence was not exactly [`FRAME_LEN`] bytes long.
    BadLength(usize),
    /// First byte was not [`FRAME_PREFIX`].
    BadPrefix(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BadLength(n) => {
                write!(f, "corrupted payload: length {n} (expected {FRAME_LEN})")
            }
            FrameError::BadPrefix(b) => write!(f, "corrupted payload: prefix 0x{b:02X}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Decode raw bytes into a [`Frame`].
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() != FRAME_LEN {
        return Err(FrameError::BadLength(bytes.len()));
    }
    if bytes[0] != FRAME_PREFIX {
        return Err(FrameError::BadPrefix(bytes[0]));
    }
    Ok(Frame {
        class: bytes[1],
        opcode: bytes[2],
    })
}

/// Encode a class/opcode pair into wire bytes.
pub const fn encode(class: u8, opcode: u8) -> [u8; FRAME_LEN] {
    [FRAME_PREFIX, class, opcode]
}

/// Parse hex bytes such as `"00 FE 02"`, `"00fe02"` or `"0x00,0xFE,0x02"`.
///
/// Any number of bytes is accepted; frame structure is not checked.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let cleaned: String = s
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .map(|part| part.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    if cleaned.is_empty()
        || !cleaned.chars().all(|c| c.is_ascii_hexdigit())
        || cleaned.len() % 2 != 0
    {
        return Err(format!("invalid hex bytes: {s:?}"));
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&cleaned[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| format!("invalid hex bytes: {s:?}"))
}

/// Parse a hex frame. A wrong length or prefix is reported as a [`FrameError`].
pub fn parse_frame_hex(s: &str) -> Result<Frame, String> {
    let bytes = parse_hex_bytes(s)?;
    decode(&bytes).map_err(|e| e.to_string())
}
