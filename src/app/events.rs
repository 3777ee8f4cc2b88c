//! Outbound device events.
//!
//! The session and its Services publish these through the
//! [`EventSink`](super::ports::EventSink) port. The host decides what to do
//! with them: refresh a UI, persist preferences, raise a notification.

use crate::link::transport::ConnectionState;

use super::system::{BatteryState, SleepState, WearingState};

/// Structured events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    ConnectionState(ConnectionState),

    /// The handshake was rejected. Terminal for this connection attempt.
    AuthenticationFailed,

    VersionInfo { firmware: String, hardware: String },
    DeviceInfo { key: String, value: String },

    Battery { level: Option<u8>, state: BatteryState },
    Wearing(WearingState),
    Sleep(SleepState),

    FindPhone { start: bool },

    /// Device-side settings the host should persist.
    UpdatePreferences(Vec<(String, PrefValue)>),

    /// Activity data chunk from the fitness channel.
    ActivityData(Vec<u8>),

    Busy(Option<String>),
    InstallStatus { message: String, success: bool },
}

/// Value of one mirrored preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefValue {
    Text(String),
    Flag(bool),
    List(Vec<String>),
    Unset,
}
