//! Streaming-transport frame codec.
//!
//! Wire format (little-endian):
//! ```text
//! ┌──────────┬────┬───────┬────────┬────────┬────────┬──────┬─────────┬────┐
//! │ BA DC FE │ ch │ flags │ len LE │ opcode │ serial │ type │ payload │ EF │
//! │    3B    │ 1B │  1B   │   2B   │   1B   │   1B   │  1B  │   N B   │ 1B │
//! └──────────┴────┴───────┴────────┴────────┴────────┴──────┴─────────┴────┘
//! ```
//!
//! `len` covers opcode, serial, type and payload (N + 3). Encrypted payloads
//! carry a 2-byte little-endian counter ahead of the ciphertext.

use log::warn;

use crate::error::{CipherError, FrameError};

pub const PREAMBLE: [u8; 3] = [0xBA, 0xDC, 0xFE];
pub const EPILOGUE: u8 = 0xEF;

/// Preamble, channel, flags, length, opcode, serial, type and epilogue.
pub const FRAME_OVERHEAD: usize = 11;

/// Bytes outside the length-covered region (preamble, channel, flags,
/// length field, epilogue).
pub const LENGTH_OFFSET: usize = 8;

const FLAG_BIT: u8 = 0x80;
const NEEDS_RESPONSE_BIT: u8 = 0x40;

/// Opcode used for every outbound command frame.
pub const OPCODE_SEND: u8 = 2;

// ── Channel / data type ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Version,
    ProtoRx,
    ProtoTx,
    Fitness,
    Voice,
    MassStorage,
    Ota,
    /// Any other 4-bit channel id.
    Other(u8),
}

impl Channel {
    pub fn id(self) -> u8 {
        match self {
            Self::Version => 0,
            Self::ProtoRx => 1,
            Self::ProtoTx => 2,
            Self::Fitness => 3,
            Self::Voice => 4,
            Self::MassStorage => 5,
            Self::Ota => 7,
            Self::Other(id) => id & 0x0F,
        }
    }
}

impl From<u8> for Channel {
    fn from(id: u8) -> Self {
        match id {
            0 => Self::Version,
            1 => Self::ProtoRx,
            2 => Self::ProtoTx,
            3 => Self::Fitness,
            4 => Self::Voice,
            5 => Self::MassStorage,
            7 => Self::Ota,
            other => Self::Other(other & 0x0F),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Plain,
    Encrypted,
    Auth,
    Other(u8),
}

impl DataType {
    pub fn id(self) -> u8 {
        match self {
            Self::Plain => 0,
            Self::Encrypted => 1,
            Self::Auth => 2,
            Self::Other(id) => id,
        }
    }
}

impl From<u8> for DataType {
    fn from(id: u8) -> Self {
        match id {
            0 => Self::Plain,
            1 => Self::Encrypted,
            2 => Self::Auth,
            other => Self::Other(other),
        }
    }
}

// ── Cipher seam ──────────────────────────────────────────────

/// Seals and opens frame payloads. Implemented by the session cipher once
/// the handshake has derived keys.
pub trait PayloadCipher {
    /// Encrypt `plain` under the given counter value.
    fn seal(&self, counter: u16, plain: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Decrypt a `counter || ciphertext` payload.
    fn open(&self, payload: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Cipher used before keys exist. Refuses every operation.
pub struct NoCipher;

impl PayloadCipher for NoCipher {
    fn seal(&self, _counter: u16, _plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        Err(CipherError::NoSessionKeys)
    }

    fn open(&self, _payload: &[u8]) -> Result<Vec<u8>, CipherError> {
        Err(CipherError::NoSessionKeys)
    }
}

/// Seal `plain`, advancing `counter` only if sealing succeeds. Returns the
/// `counter || ciphertext` payload.
pub fn seal_with_counter(
    cipher: &dyn PayloadCipher,
    counter: &mut u16,
    plain: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let next = counter.wrapping_add(1);
    let sealed = cipher.seal(next, plain)?;
    *counter = next;

    let mut out = Vec::with_capacity(2 + sealed.len());
    out.extend_from_slice(&next.to_le_bytes());
    out.extend_from_slice(&sealed);
    Ok(out)
}

// ── Frame ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: Channel,
    pub flag: bool,
    pub needs_response: bool,
    pub opcode: u8,
    pub serial: u8,
    pub data_type: DataType,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Frame carrying outbound command bytes on the proto-tx channel.
    pub fn command(serial: u8, data_type: DataType, payload: Vec<u8>) -> Self {
        Self {
            channel: Channel::ProtoTx,
            flag: true,
            needs_response: false,
            opcode: OPCODE_SEND,
            serial,
            data_type,
            payload,
        }
    }

    /// Decode one frame from the start of `bytes`. Bytes past the frame's
    /// declared end are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(FrameError::Incomplete);
        }
        if bytes[..3] != PREAMBLE {
            warn!("SPP: bad preamble {:02x?}", &bytes[..3]);
            return Err(FrameError::Malformed);
        }

        let mut channel = bytes[3];
        if channel & 0xF0 != 0 {
            warn!("SPP: channel byte {channel:#04x} has high bits set, clamping");
            channel = 0x0F;
        }

        let flags = bytes[4];
        if flags & 0x0F != 0 {
            warn!("SPP: unexpected low flag bits {flags:#04x}");
        }

        let declared = u16::from_le_bytes([bytes[5], bytes[6]]) as usize;
        let Some(payload_len) = declared.checked_sub(3) else {
            warn!("SPP: length field {declared} shorter than header");
            return Err(FrameError::Malformed);
        };
        if payload_len + FRAME_OVERHEAD > bytes.len() {
            return Err(FrameError::Incomplete);
        }

        let end = 10 + payload_len;
        if bytes[end] != EPILOGUE {
            warn!("SPP: bad epilogue {:#04x}", bytes[end]);
            return Err(FrameError::Malformed);
        }

        Ok(Self {
            channel: Channel::from(channel),
            flag: flags & FLAG_BIT != 0,
            needs_response: flags & NEEDS_RESPONSE_BIT != 0,
            opcode: bytes[7],
            serial: bytes[8],
            data_type: DataType::from(bytes[9]),
            payload: bytes[10..end].to_vec(),
        })
    }

    /// Encode this frame. Encrypted frames advance `counter` and are sealed
    /// with the advanced value; other data types leave it alone.
    pub fn encode(
        &self,
        counter: &mut u16,
        cipher: &dyn PayloadCipher,
    ) -> Result<Vec<u8>, CipherError> {
        let sealed;
        let payload: &[u8] = if self.data_type == DataType::Encrypted {
            sealed = seal_with_counter(cipher, counter, &self.payload)?;
            &sealed
        } else {
            &self.payload
        };

        let mut out = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
        out.extend_from_slice(&PREAMBLE);
        out.push(self.channel.id() & 0x0F);
        let mut flags = 0;
        if self.flag {
            flags |= FLAG_BIT;
        }
        if self.needs_response {
            flags |= NEEDS_RESPONSE_BIT;
        }
        out.push(flags);
        out.extend_from_slice(&((payload.len() + 3) as u16).to_le_bytes());
        out.push(self.opcode);
        out.push(self.serial);
        out.push(self.data_type.id());
        out.extend_from_slice(payload);
        out.push(EPILOGUE);
        Ok(out)
    }
}
