//! Wire-level command messages.
//!
//! A [`Command`] is what Services exchange with the watch. It travels inside
//! a streaming frame's payload or directly as a GATT resource value, encoded
//! with postcard. The first two bytes of the encoding are always the major
//! type and the subtype, which keeps captures readable.

use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// One application message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Major type: which Service owns this message.
    pub kind: u8,
    pub subtype: u8,
    pub body: Body,
}

impl Command {
    pub fn new(kind: u8, subtype: u8, body: Body) -> Self {
        Self {
            kind,
            subtype,
            body,
        }
    }

    /// Bodyless request, e.g. "send me the battery level".
    pub fn request(kind: u8, subtype: u8) -> Self {
        Self::new(kind, subtype, Body::Empty)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    Empty,
    /// Bare status reply; 0 means success.
    Status(u32),
    Auth(AuthBody),
    System(SystemBody),
    Upload(UploadBody),
    /// Opaque body for categories handled by host-registered services.
    Raw(Vec<u8>),
}

// ── Auth ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthBody {
    PhoneNonce {
        nonce: [u8; 16],
    },
    WatchNonce {
        nonce: [u8; 16],
        proof: [u8; 32],
    },
    PhoneProof {
        proof: [u8; 32],
        /// AES-CCM sealed [`PhoneInfo`], counter 0.
        sealed_info: Vec<u8>,
    },
    UserId(String),
}

/// Identity the phone presents during the encrypted handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneInfo {
    pub api_level: u32,
    pub name: String,
    pub region: String,
}

// ── System ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemBody {
    DeviceInfo(DeviceInfo),
    Battery(Battery),
    Clock(Clock),
    FirmwareInstallRequest { version: String, md5: String },
    FirmwareInstallResponse { status: u32 },
    Language { code: String },
    Password(Password),
    /// Find phone / find watch. 0 starts, anything else stops.
    FindDevice(u32),
    DisplayItems(Vec<DisplayItem>),
    VibrationPatterns(VibrationPatterns),
    BasicDeviceState(BasicDeviceState),
    DeviceState(DeviceState),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub firmware: String,
    pub model: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battery {
    pub level: u8,
    /// Raw charger state: 1 charging, 2 normal.
    pub state: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
    /// UTC offset in 15-minute units.
    pub zone_offset: i8,
    /// DST offset in 15-minute units.
    pub dst_offset: i8,
    pub zone_name: String,
    pub is_not_24_hour: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password {
    /// 2 enabled, 1 disabled.
    pub state: u32,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayItem {
    pub code: String,
    pub name: String,
    pub disabled: bool,
    pub in_more_section: bool,
    pub is_settings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibrationPatterns {
    pub notification_types: Vec<VibrationNotificationType>,
    pub custom: Vec<CustomVibrationPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibrationNotificationType {
    pub notification_type: u32,
    pub preset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVibrationPattern {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicDeviceState {
    pub is_charging: bool,
    pub battery_level: Option<u8>,
    pub is_user_asleep: bool,
    pub is_worn: bool,
}

/// Raw state values: wearing 1 worn / 2 not worn, charging 1 charging /
/// 2 normal, sleep 1 asleep / 2 awake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub wearing: Option<u32>,
    pub charging: Option<u32>,
    pub sleep: Option<u32>,
}

// ── Upload ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadBody {
    Request { kind: u8, md5: [u8; 16], size: u32 },
    Ack { status: u32, chunk_size: u32 },
}
