//! In-memory preference store.
//!
//! Implements [`PreferenceStore`] over a `HashMap`. Hosts that persist
//! settings elsewhere can seed it at connect time and apply the
//! [`DeviceEvent::UpdatePreferences`] the engine emits.

use std::collections::HashMap;

use log::debug;

use crate::app::events::{DeviceEvent, PrefValue};
use crate::app::ports::PreferenceStore;

#[derive(Debug, Default, Clone)]
pub struct MemoryPreferences {
    store: HashMap<String, String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.store.insert(key.into(), value.into());
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, if value { "true" } else { "false" });
    }

    pub fn set_list(&mut self, key: impl Into<String>, items: &[&str]) {
        self.set(key, items.join(","));
    }

    pub fn remove(&mut self, key: &str) {
        self.store.remove(key);
    }

    /// Apply the preferences carried by an engine event. Other events are
    /// ignored.
    pub fn apply(&mut self, event: &DeviceEvent) {
        let DeviceEvent::UpdatePreferences(prefs) = event else {
            return;
        };
        for (key, value) in prefs {
            debug!("prefs: {key} <- {value:?}");
            match value {
                PrefValue::Text(text) => self.set(key.clone(), text.clone()),
                PrefValue::Flag(flag) => self.set_bool(key.clone(), *flag),
                PrefValue::List(items) => self.set(key.clone(), items.join(",")),
                PrefValue::Unset => self.remove(key),
            }
        }
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        self.store.get(key).cloned()
    }
}
