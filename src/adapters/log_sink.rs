//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every [`DeviceEvent`] through the
//! `log` facade. Useful on its own for headless hosts, or chained in front
//! of a UI sink.

use log::{info, warn};

use crate::app::events::{DeviceEvent, PrefValue};
use crate::app::ports::EventSink;

/// Adapter that logs every [`DeviceEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: usize,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events seen so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &DeviceEvent) {
        self.emitted += 1;
        match event {
            DeviceEvent::ConnectionState(state) => info!("STATE | {state:?}"),
            DeviceEvent::AuthenticationFailed => warn!("AUTH | rejected by watch"),
            DeviceEvent::VersionInfo { firmware, hardware } => {
                info!("INFO | fw={firmware} hw={hardware}");
            }
            DeviceEvent::DeviceInfo { key, value } => info!("INFO | {key}={value}"),
            DeviceEvent::Battery { level, state } => match level {
                Some(level) => info!("BATT | {level}% {state:?}"),
                None => info!("BATT | ?% {state:?}"),
            },
            DeviceEvent::Wearing(state) => info!("WEAR | {state:?}"),
            DeviceEvent::Sleep(state) => info!("SLEEP | {state:?}"),
            DeviceEvent::FindPhone { start } => info!("FIND | phone start={start}"),
            DeviceEvent::UpdatePreferences(prefs) => {
                for (key, value) in prefs {
                    match value {
                        PrefValue::Text(text) => info!("PREF | {key}={text}"),
                        PrefValue::Flag(flag) => info!("PREF | {key}={flag}"),
                        PrefValue::List(items) => info!("PREF | {key}=[{}]", items.join(",")),
                        PrefValue::Unset => info!("PREF | {key} unset"),
                    }
                }
            }
            DeviceEvent::ActivityData(bytes) => info!("DATA | {} activity bytes", bytes.len()),
            DeviceEvent::Busy(Some(task)) => info!("BUSY | {task}"),
            DeviceEvent::Busy(None) => info!("BUSY | idle"),
            DeviceEvent::InstallStatus { message, success } => {
                if *success {
                    info!("INSTALL | {message}");
                } else {
                    warn!("INSTALL | {message}");
                }
            }
        }
    }
}
