//! Port traits: the boundary between the protocol engine and the host.
//!
//! ```text
//!   Host adapter ──▶ Port trait ──▶ Session / Services
//! ```
//!
//! The radio side lives in [`crate::link::transport::RadioPort`]; the ports
//! here cover what the Services consume and produce.

use super::events::DeviceEvent;

// ───────────────────────────────────────────────────────────────
// Event sink port (engine → host)
// ───────────────────────────────────────────────────────────────

/// The engine emits structured [`DeviceEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &DeviceEvent);
}

/// Collects events in memory. Handy for hosts that poll, and for tests.
#[derive(Debug, Default)]
pub struct VecEventSink {
    pub events: Vec<DeviceEvent>,
}

impl EventSink for VecEventSink {
    fn emit(&mut self, event: &DeviceEvent) {
        self.events.push(event.clone());
    }
}

// ───────────────────────────────────────────────────────────────
// Preference store port (host settings → engine)
// ───────────────────────────────────────────────────────────────

/// Read access to the per-device settings the host persists.
///
/// Lists are stored comma-joined, matching how the Services publish them
/// in [`DeviceEvent::UpdatePreferences`].
pub trait PreferenceStore {
    fn get_string(&self, key: &str) -> Option<String>;

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_string(key).as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    fn get_list(&self, key: &str) -> Vec<String> {
        self.get_string(key)
            .map(|s| {
                s.split(',')
                    .filter(|item| !item.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ───────────────────────────────────────────────────────────────
// Time source port (host clock → engine)
// ───────────────────────────────────────────────────────────────

/// Wall-clock reading in the host's local zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTime {
    pub year: u16,
    /// 1-based.
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
    /// Standard UTC offset, seconds.
    pub zone_offset_secs: i32,
    /// Daylight-saving offset currently in effect, seconds.
    pub dst_offset_secs: i32,
    /// Zone id, e.g. `Europe/Berlin`.
    pub zone_name: String,
}

pub trait TimeSource {
    fn now(&self) -> LocalTime;
}
