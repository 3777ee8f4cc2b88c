//! Firmware image descriptor and header detection.
//!
//! Only the header is inspected; the watch validates the rest.
//!
//! | Kind      | Signature                                   |
//! |-----------|---------------------------------------------|
//! | Firmware  | `20 99 12 01 08` at offset 3                |
//! | Watchface | `UIHH` at offset 0, byte 4 is 1 or 2        |
//! | Gps       | fixed 16-byte magic at offset 0             |

use md5::{Digest, Md5};

use crate::error::FirmwareError;
use crate::link::upload::{TYPE_FIRMWARE, TYPE_WATCHFACE};

const FW_OFFSET: usize = 3;
const FW_HEADER: [u8; 5] = [0x20, 0x99, 0x12, 0x01, 0x08];

const UIHH_HEADER: &[u8; 4] = b"UIHH";

const GPS_HEADER: [u8; 16] = [
    0x73, 0x75, 0x68, 0xd0, 0x70, 0x73, 0xbb, 0x5a, 0x3e, 0xc3, 0xd3, 0x09, 0x9e, 0x1d, 0xd3, 0xc9,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareKind {
    Firmware,
    Watchface,
    Gps,
    Invalid,
}

impl FirmwareKind {
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.get(FW_OFFSET..FW_OFFSET + FW_HEADER.len()) == Some(&FW_HEADER[..]) {
            return Self::Firmware;
        }
        if bytes.starts_with(UIHH_HEADER) && matches!(bytes.get(4), Some(1 | 2)) {
            return Self::Watchface;
        }
        if bytes.starts_with(&GPS_HEADER) {
            return Self::Gps;
        }
        Self::Invalid
    }

    /// Upload type tag, for kinds that can be uploaded.
    pub fn upload_type(self) -> Option<u8> {
        match self {
            Self::Firmware => Some(TYPE_FIRMWARE),
            Self::Watchface => Some(TYPE_WATCHFACE),
            Self::Gps | Self::Invalid => None,
        }
    }
}

pub fn md5_digest(bytes: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md5::digest(bytes));
    out
}

/// Descriptor carried through an install: version, checksum, bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    kind: FirmwareKind,
    version: String,
    md5: [u8; 16],
    bytes: Vec<u8>,
}

impl FirmwareImage {
    pub fn from_bytes(bytes: Vec<u8>, version: impl Into<String>) -> Result<Self, FirmwareError> {
        if bytes.is_empty() {
            return Err(FirmwareError::Empty);
        }
        let kind = FirmwareKind::detect(&bytes);
        if kind == FirmwareKind::Invalid {
            return Err(FirmwareError::UnknownFormat);
        }
        Ok(Self {
            kind,
            version: version.into(),
            md5: md5_digest(&bytes),
            bytes,
        })
    }

    pub fn kind(&self) -> FirmwareKind {
        self.kind
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }

    pub fn is_firmware(&self) -> bool {
        self.kind == FirmwareKind::Firmware
    }
}
