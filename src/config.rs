//! Link configuration and the model capability table.
//!
//! [`LinkConfig`] is what the host hands the engine at construction: the
//! pairing secret, identity sent during the handshake, locale and the
//! localized strings used in busy/install messages. [`Capabilities`] says
//! what a given watch model supports.

use serde::{Deserialize, Serialize};

use crate::app::commands::PhoneInfo;
use crate::error::Error;

// ── Link configuration ───────────────────────────────────────

/// Per-device engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// 16-byte pairing secret as 32 hex chars, `0x` prefix allowed.
    pub auth_key: String,
    /// Account id used by the clear-text handshake.
    pub user_id: String,
    /// Host locale, `lang_COUNTRY`.
    pub locale: String,

    // --- Handshake identity ---
    pub phone_name: String,
    pub api_level: u32,
    pub region: String,

    // --- Transport ---
    /// MTU requested on the GATT link.
    pub mtu_request: u16,
    /// Largest frame the streaming link carries.
    pub stream_chunk_size: usize,

    pub messages: Messages,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            auth_key: String::new(),
            user_id: String::new(),
            locale: "en_US".into(),

            phone_name: "wearlink".into(),
            api_level: 34,
            region: "US".into(),

            mtu_request: 247,
            stream_chunk_size: 2048,

            messages: Messages::default(),
        }
    }
}

impl LinkConfig {
    /// Decode the pairing secret.
    pub fn secret(&self) -> Result<[u8; 16], Error> {
        let key = self.auth_key.trim();
        let key = key
            .strip_prefix("0x")
            .or_else(|| key.strip_prefix("0X"))
            .unwrap_or(key);
        if key.len() != 32 {
            return Err(Error::Config("auth key must be 32 hex characters"));
        }
        let mut secret = [0u8; 16];
        hex::decode_to_slice(key, &mut secret)
            .map_err(|_| Error::Config("auth key is not valid hex"))?;
        Ok(secret)
    }

    pub fn phone_info(&self) -> PhoneInfo {
        PhoneInfo {
            api_level: self.api_level,
            name: self.phone_name.clone(),
            region: self.region.clone(),
        }
    }

    /// Locale as `lang_COUNTRY`. A bare language gets itself as country.
    pub fn resolved_locale(&self) -> String {
        let mut parts = self.locale.split(['_', '-']);
        let language = parts.next().unwrap_or_default().to_lowercase();
        let country = match parts.next() {
            Some(country) if !country.is_empty() => country.to_uppercase(),
            _ => language.to_uppercase(),
        };
        format!("{language}_{country}")
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        self.secret()?;
        if self.mtu_request < 23 {
            return Err(Error::Config("mtu_request below the BLE minimum of 23"));
        }
        if self.stream_chunk_size < 16 {
            return Err(Error::Config("stream_chunk_size too small"));
        }
        Ok(())
    }
}

/// Localized strings surfaced in busy and install events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    pub updating_firmware: String,
    pub update_in_progress: String,
    pub update_complete: String,
    pub write_failed: String,
    /// Label of the "more" display-item section.
    pub more: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            updating_firmware: "Updating firmware".into(),
            update_in_progress: "Firmware update in progress".into(),
            update_complete: "Update complete".into(),
            write_failed: "Write failed".into(),
            more: "More".into(),
        }
    }
}

// ── Capability table ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    Ble,
    Stream,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordMode {
    None,
    Numbers4,
    Numbers6,
}

/// What one watch model supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub model: String,
    pub connection: ConnectionType,
    pub supports_find_device: bool,
    pub password: PasswordMode,
    /// Wearing and sleep arrive through device-state pushes only.
    pub wearing_and_sleep_via_device_state: bool,
    pub languages: Vec<String>,
}

pub const MODEL_WATCH_S1: &str = "xiaomi_watch_s1";
pub const MODEL_WATCH_S1_PRO: &str = "xiaomi_watch_s1_pro";
pub const MODEL_WATCH_S1_ACTIVE: &str = "xiaomi_watch_s1_active";

const LANGUAGES: &[&str] = &[
    "auto", "ar_SA", "cs_CZ", "da_DK", "de_DE", "el_GR", "en_US", "es_ES", "fr_FR", "he_IL",
    "id_ID", "it_IT", "ja_JP", "ko_KO", "nl_NL", "nb_NO", "pl_PL", "pt_BR", "pt_PT", "ro_RO",
    "ru_RU", "sv_SE", "th_TH", "tr_TR", "uk_UA", "vi_VN", "zh_CN", "zh_TW",
];

/// Advertised-name prefix → model id.
const NAME_PREFIXES: &[(&str, &str)] = &[
    ("Xiaomi Watch S1 Pro ", MODEL_WATCH_S1_PRO),
    ("XiaomiWatchS1Active ", MODEL_WATCH_S1_ACTIVE),
    ("Xiaomi Watch S1 ", MODEL_WATCH_S1),
];

impl Capabilities {
    /// Table lookup. `None` for models not in the table.
    pub fn for_model(model: &str) -> Option<Self> {
        let supports_find_device = match model {
            MODEL_WATCH_S1 | MODEL_WATCH_S1_PRO => true,
            MODEL_WATCH_S1_ACTIVE => false,
            _ => return None,
        };
        Some(Self {
            model: model.to_owned(),
            connection: ConnectionType::Both,
            supports_find_device,
            password: PasswordMode::Numbers6,
            wearing_and_sleep_via_device_state: false,
            languages: LANGUAGES.iter().map(|l| (*l).to_owned()).collect(),
        })
    }

    /// Model id from an advertised device name.
    pub fn model_for_name(name: &str) -> Option<&'static str> {
        NAME_PREFIXES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, model)| *model)
    }

    pub fn supports_language(&self, code: &str) -> bool {
        self.languages.iter().any(|l| l == code)
    }
}

impl Default for Capabilities {
    /// Everything on, for hosts that do not know the model.
    fn default() -> Self {
        Self {
            model: String::new(),
            connection: ConnectionType::Both,
            supports_find_device: true,
            password: PasswordMode::None,
            wearing_and_sleep_via_device_state: false,
            languages: vec!["auto".into()],
        }
    }
}
