//! System Service (command type 2).
//!
//! Owns the device-status cache (battery, wearing, sleep), the firmware
//! install flow, and the settings the watch keeps on its side: language,
//! clock, password, menu layout and vibration presets.
//!
//! Status changes surface as events only when a known state is replaced
//! by a different one; the first report after connect just primes the
//! cache.
//!
//! ```text
//! install_firmware ──▶ InstallRequested ──(status 0)──▶ Uploading ──▶ Idle
//!                            └──────(status ≠ 0)─────────────────────▶ Idle
//! ```

use core::fmt;

use log::{debug, info, warn};

use crate::config::{Capabilities, LinkConfig, Messages};
use crate::error::{Error, FirmwareError, LinkError};
use crate::firmware::FirmwareImage;
use crate::link::dispatch::{Outbox, Service, ServiceContext};
use crate::link::transport::Transaction;
use crate::link::upload::{UploadListener, TYPE_FIRMWARE};

use super::commands::{
    Body, Clock, Command, DisplayItem, Password, SystemBody, VibrationNotificationType,
    VibrationPatterns,
};
use super::display_items::{self, DisplayItemPrefs};
use super::events::{DeviceEvent, PrefValue};

// ── Constants ────────────────────────────────────────────────

pub const SYSTEM_COMMAND_TYPE: u8 = 2;

pub const CMD_BATTERY: u8 = 1;
pub const CMD_DEVICE_INFO: u8 = 2;
pub const CMD_CLOCK: u8 = 3;
pub const CMD_FIRMWARE_INSTALL: u8 = 5;
pub const CMD_LANGUAGE: u8 = 6;
pub const CMD_PASSWORD_GET: u8 = 9;
pub const CMD_FIND_PHONE: u8 = 17;
pub const CMD_FIND_WATCH: u8 = 18;
pub const CMD_PASSWORD_SET: u8 = 21;
pub const CMD_DISPLAY_ITEMS_GET: u8 = 29;
pub const CMD_DISPLAY_ITEMS_SET: u8 = 30;
pub const CMD_VIBRATION_PATTERNS_GET: u8 = 46;
pub const CMD_VIBRATION_PATTERNS_SET: u8 = 47;
pub const CMD_VIBRATION_PATTERNS_DEL: u8 = 61;
pub const CMD_DEVICE_STATE_GET: u8 = 78;
pub const CMD_DEVICE_STATE: u8 = 79;

// ── Preference keys ──────────────────────────────────────────

pub const PREF_LANGUAGE: &str = "language";
pub const PREF_LANGUAGE_AUTO: &str = "auto";
pub const PREF_TIMEFORMAT: &str = "timeformat";
pub const PREF_TIMEFORMAT_12H: &str = "am/pm";
pub const PREF_PASSWORD_ENABLED: &str = "password_enabled";
pub const PREF_PASSWORD: &str = "password";
pub const PREF_DISPLAY_ITEMS: &str = "display_items_sortable";
pub const PREF_DISPLAY_ITEMS_CODES: &str = "display_items_sortable_possible_values";
pub const PREF_DISPLAY_ITEMS_LABELS: &str = "display_items_sortable_possible_value_labels";
pub const PREF_SETTINGS_DISPLAY_ITEM_CODE: &str = "settings_display_item_code";
pub const PREF_VIBRATION_PROFILE_PREFIX: &str = "vibration_profile_";
pub const PREF_VIBRATION_NOTIFICATION_TYPES: &str = "vibration_pattern_notification_types";
pub const PREF_VIBRATION_PATTERN_IDS: &str = "vibration_pattern_ids";
pub const PREF_VIBRATION_PATTERN_NAMES: &str = "vibration_pattern_names";

/// Vibration notification types, indexed by wire value - 1.
const VIBRATION_TYPES: [&str; 8] = [
    "incoming_call",
    "event_reminder",
    "alarm",
    "app_alerts",
    "idle_alerts",
    "incoming_sms",
    "goal_notification",
    "schedule",
];

// ── Device status ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryState {
    #[default]
    Unknown,
    Charging,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WearingState {
    #[default]
    Unknown,
    Worn,
    NotWorn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SleepState {
    #[default]
    Unknown,
    Asleep,
    Awake,
}

impl BatteryState {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Charging),
            2 => Some(Self::Normal),
            _ => None,
        }
    }
}

impl WearingState {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Worn),
            2 => Some(Self::NotWorn),
            _ => None,
        }
    }
}

impl SleepState {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Asleep),
            2 => Some(Self::Awake),
            _ => None,
        }
    }
}

/// Store `new`; report whether a known state was replaced by a different one.
fn update_status<S: Copy + PartialEq + Default + fmt::Debug>(current: &mut S, new: S) -> bool {
    debug!("SYS: {:?} -> {:?}", current, new);
    let changed = *current != S::default() && *current != new;
    *current = new;
    changed
}

// ── Firmware install ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    Idle,
    InstallRequested(FirmwareImage),
    Uploading(FirmwareImage),
}

// ── Service ──────────────────────────────────────────────────

pub struct SystemService {
    caps: Capabilities,
    locale: String,
    messages: Messages,

    battery: BatteryState,
    wearing: WearingState,
    sleep: SleepState,

    install: InstallState,
}

impl SystemService {
    pub fn new(caps: Capabilities, config: &LinkConfig) -> Self {
        Self {
            caps,
            locale: config.resolved_locale(),
            messages: config.messages.clone(),
            battery: BatteryState::Unknown,
            wearing: WearingState::Unknown,
            sleep: SleepState::Unknown,
            install: InstallState::Idle,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn battery_state(&self) -> BatteryState {
        self.battery
    }

    pub fn wearing_state(&self) -> WearingState {
        self.wearing
    }

    pub fn sleep_state(&self) -> SleepState {
        self.sleep
    }

    pub fn install_state(&self) -> &InstallState {
        &self.install
    }

    /// Forget cached status (new connection).
    pub fn reset_status(&mut self) {
        self.battery = BatteryState::Unknown;
        self.wearing = WearingState::Unknown;
        self.sleep = SleepState::Unknown;
    }

    // ── Host-initiated operations ─────────────────────────────

    /// Ask the watch to accept `image`. The upload starts once it agrees.
    pub fn install_firmware(&mut self, image: FirmwareImage, out: &mut Outbox) -> crate::error::Result<()> {
        if !image.is_firmware() {
            return Err(Error::Firmware(FirmwareError::NotFirmware));
        }
        if self.install != InstallState::Idle {
            warn!("SYS: install already in progress");
            return Err(Error::Link(LinkError::UploadInProgress));
        }

        info!("SYS: requesting install of firmware {}", image.version());
        out.send(
            format!("install firmware {}", image.version()),
            system(
                CMD_FIRMWARE_INSTALL,
                SystemBody::FirmwareInstallRequest {
                    version: image.version().to_owned(),
                    md5: image.md5_hex(),
                },
            ),
        );
        self.install = InstallState::InstallRequested(image);
        Ok(())
    }

    /// Upload progress for the running install, as an ordered queue op.
    pub fn on_upload_progress(&self, percent: u8, tx: &mut Transaction) {
        tx.progress(self.messages.update_in_progress.clone(), percent);
    }

    pub fn on_upload_finish(&mut self, success: bool, out: &mut Outbox) {
        info!("SYS: firmware upload finished, success={success}");
        let message = if success {
            &self.messages.update_complete
        } else {
            &self.messages.write_failed
        };
        out.emit(DeviceEvent::InstallStatus {
            message: message.clone(),
            success,
        });
        out.emit(DeviceEvent::Busy(None));
        self.install = InstallState::Idle;
    }

    pub fn set_language(&self, ctx: &mut ServiceContext<'_>) {
        let mut locale = ctx
            .prefs
            .get_string(PREF_LANGUAGE)
            .unwrap_or_else(|| PREF_LANGUAGE_AUTO.to_owned());
        if locale == PREF_LANGUAGE_AUTO {
            locale = self.locale.clone();
        }
        info!("SYS: set language {locale}");
        ctx.out.send(
            "set language",
            system(
                CMD_LANGUAGE,
                SystemBody::Language {
                    code: locale.to_lowercase(),
                },
            ),
        );
    }

    pub fn set_current_time(&self, ctx: &mut ServiceContext<'_>) {
        let now = ctx.clock.now();
        let is_12_hour = ctx.prefs.get_string(PREF_TIMEFORMAT).as_deref() == Some(PREF_TIMEFORMAT_12H);
        debug!("SYS: set time {}-{:02}-{:02} {}", now.year, now.month, now.day, now.zone_name);

        let clock = Clock {
            year: now.year,
            month: now.month,
            day: now.day,
            hour: now.hour,
            minute: now.minute,
            second: now.second,
            millisecond: now.millisecond,
            zone_offset: quarter_hours(now.zone_offset_secs),
            dst_offset: quarter_hours(now.dst_offset_secs),
            zone_name: now.zone_name,
            is_not_24_hour: is_12_hour,
        };
        ctx.out.send("set time", system(CMD_CLOCK, SystemBody::Clock(clock)));
    }

    pub fn set_password(&self, ctx: &mut ServiceContext<'_>) {
        let enabled = ctx.prefs.get_bool(PREF_PASSWORD_ENABLED, false);
        let password = ctx.prefs.get_string(PREF_PASSWORD).unwrap_or_default();
        if password.is_empty() {
            warn!("SYS: refusing to set an empty password");
            return;
        }
        info!("SYS: set password, enabled={enabled}");
        ctx.out.send(
            "set password",
            system(
                CMD_PASSWORD_SET,
                SystemBody::Password(Password {
                    state: if enabled { 2 } else { 1 },
                    password: Some(password),
                }),
            ),
        );
    }

    pub fn set_display_items(&self, ctx: &mut ServiceContext<'_>) {
        let prefs = DisplayItemPrefs {
            all_codes: ctx.prefs.get_list(PREF_DISPLAY_ITEMS_CODES),
            all_labels: ctx.prefs.get_list(PREF_DISPLAY_ITEMS_LABELS),
            enabled: ctx.prefs.get_list(PREF_DISPLAY_ITEMS),
            settings_code: ctx.prefs.get_string(PREF_SETTINGS_DISPLAY_ITEM_CODE),
        };
        let items = match display_items::from_prefs(&prefs) {
            Ok(items) => items,
            Err(e) => {
                warn!("SYS: cannot rebuild display items: {e:?}");
                return;
            }
        };
        debug!("SYS: set display items {:?}", prefs.enabled);
        ctx.out.send(
            "set display items",
            system(CMD_DISPLAY_ITEMS_SET, SystemBody::DisplayItems(items)),
        );
    }

    /// Set the preset for one notification type, by preference name.
    pub fn set_vibration_preset(
        &self,
        notification: &str,
        preset: u32,
        out: &mut Outbox,
    ) -> Result<(), LinkError> {
        let Some(index) = VIBRATION_TYPES.iter().position(|t| *t == notification) else {
            warn!("SYS: unknown vibration notification type {notification}");
            return Err(LinkError::Unsupported);
        };
        out.send(
            format!("set vibration {notification}"),
            system(
                CMD_VIBRATION_PATTERNS_SET,
                SystemBody::VibrationPatterns(VibrationPatterns {
                    notification_types: vec![VibrationNotificationType {
                        notification_type: index as u32 + 1,
                        preset,
                    }],
                    custom: Vec::new(),
                }),
            ),
        );
        Ok(())
    }

    /// The phone was found; tell the watch to stop ringing it.
    pub fn find_phone_stop(&self, out: &mut Outbox) {
        out.send("find phone stop", system(CMD_FIND_PHONE, SystemBody::FindDevice(1)));
    }

    pub fn find_watch(&self, start: bool, out: &mut Outbox) -> Result<(), LinkError> {
        if !self.caps.supports_find_device {
            return Err(LinkError::Unsupported);
        }
        out.send(
            format!("find watch {start}"),
            system(CMD_FIND_WATCH, SystemBody::FindDevice(if start { 0 } else { 1 })),
        );
        Ok(())
    }

    // ── Inbound handlers ──────────────────────────────────────

    fn handle_device_info(&self, body: &Body, out: &mut Outbox) {
        let Body::System(SystemBody::DeviceInfo(info)) = body else {
            warn!("SYS: device info reply without body");
            return;
        };
        debug!("SYS: fw={} hw={} sn={}", info.firmware, info.model, info.serial_number);
        out.emit(DeviceEvent::VersionInfo {
            firmware: info.firmware.clone(),
            hardware: info.model.clone(),
        });
        out.emit(DeviceEvent::DeviceInfo {
            key: "serial_number".into(),
            value: info.serial_number.clone(),
        });
    }

    fn handle_battery(&mut self, body: &Body, out: &mut Outbox) {
        let Body::System(SystemBody::Battery(battery)) = body else {
            warn!("SYS: battery reply without body");
            return;
        };
        // Some models only report the charger state here.
        if let Some(raw) = battery.state {
            self.battery = BatteryState::from_raw(raw).unwrap_or_else(|| {
                warn!("SYS: unknown battery state {raw}");
                BatteryState::Unknown
            });
        }
        out.emit(DeviceEvent::Battery {
            level: Some(battery.level),
            state: self.battery,
        });
    }

    fn handle_basic_device_state(&mut self, body: &Body, out: &mut Outbox) {
        let Body::System(SystemBody::BasicDeviceState(state)) = body else {
            warn!("SYS: no basic device state, requesting battery");
            request_battery(out);
            return;
        };

        self.battery = if state.is_charging {
            BatteryState::Charging
        } else {
            BatteryState::Normal
        };
        match state.battery_level {
            Some(level) => out.emit(DeviceEvent::Battery {
                level: Some(level),
                state: self.battery,
            }),
            None => request_battery(out),
        }

        let sleep = if state.is_user_asleep {
            SleepState::Asleep
        } else {
            SleepState::Awake
        };
        if update_status(&mut self.sleep, sleep) {
            out.emit(DeviceEvent::Sleep(sleep));
        }

        let wearing = if state.is_worn {
            WearingState::Worn
        } else {
            WearingState::NotWorn
        };
        if update_status(&mut self.wearing, wearing) {
            out.emit(DeviceEvent::Wearing(wearing));
        }
    }

    fn handle_device_state(&mut self, body: &Body, out: &mut Outbox) {
        let Body::System(SystemBody::DeviceState(state)) = body else {
            warn!("SYS: no device state, requesting battery");
            request_battery(out);
            return;
        };

        if let Some(raw) = state.wearing {
            match WearingState::from_raw(raw) {
                Some(wearing) => {
                    if update_status(&mut self.wearing, wearing) {
                        out.emit(DeviceEvent::Wearing(wearing));
                    }
                }
                None => warn!("SYS: unknown wearing state {raw}"),
            }
        }

        // Cached until the next battery reply carries a level.
        if let Some(raw) = state.charging {
            self.battery = BatteryState::from_raw(raw).unwrap_or_default();
        }

        if let Some(raw) = state.sleep {
            match SleepState::from_raw(raw) {
                Some(sleep) => {
                    if update_status(&mut self.sleep, sleep) {
                        out.emit(DeviceEvent::Sleep(sleep));
                    }
                }
                None => warn!("SYS: unknown sleep state {raw}"),
            }
        }

        request_battery(out);
    }

    fn handle_firmware_install(&mut self, body: &Body, out: &mut Outbox) {
        let status = match body {
            Body::System(SystemBody::FirmwareInstallResponse { status }) | Body::Status(status) => *status,
            _ => {
                warn!("SYS: install reply without status");
                return;
            }
        };
        let image = match core::mem::replace(&mut self.install, InstallState::Idle) {
            InstallState::InstallRequested(image) => image,
            other => {
                warn!("SYS: install reply while {other:?}");
                self.install = other;
                return;
            }
        };
        if status != 0 {
            warn!("SYS: watch refused firmware {}, status {status}", image.version());
            return;
        }

        debug!("SYS: install accepted, uploading");
        out.emit(DeviceEvent::Busy(Some(self.messages.updating_firmware.clone())));
        out.start_upload(TYPE_FIRMWARE, image.bytes().to_vec(), UploadListener::SystemService);
        self.install = InstallState::Uploading(image);
    }

    fn handle_password(&self, body: &Body, out: &mut Outbox) {
        let Body::System(SystemBody::Password(password)) = body else {
            warn!("SYS: password reply without body");
            return;
        };
        let mut prefs = vec![(PREF_PASSWORD_ENABLED.to_owned(), PrefValue::Flag(password.state == 2))];
        if let Some(value) = &password.password {
            prefs.push((PREF_PASSWORD.to_owned(), PrefValue::Text(value.clone())));
        }
        out.emit(DeviceEvent::UpdatePreferences(prefs));
    }

    fn handle_display_items(&self, items: &[DisplayItem], out: &mut Outbox) {
        debug!("SYS: got {} display items", items.len());
        let prefs = display_items::to_prefs(items, &self.messages.more);
        let settings = match prefs.settings_code {
            Some(code) => PrefValue::Text(code),
            None => PrefValue::Unset,
        };
        out.emit(DeviceEvent::UpdatePreferences(vec![
            (PREF_DISPLAY_ITEMS_CODES.to_owned(), PrefValue::Text(prefs.all_codes.join(","))),
            (PREF_DISPLAY_ITEMS_LABELS.to_owned(), PrefValue::Text(prefs.all_labels.join(","))),
            (PREF_SETTINGS_DISPLAY_ITEM_CODE.to_owned(), settings),
            (PREF_DISPLAY_ITEMS.to_owned(), PrefValue::Text(prefs.enabled.join(","))),
        ]));
    }

    fn handle_vibration_patterns(&self, patterns: &VibrationPatterns, out: &mut Outbox) {
        let mut prefs = Vec::new();
        let mut names: Vec<String> = Vec::new();

        for entry in &patterns.notification_types {
            let Some(name) = (entry.notification_type as usize)
                .checked_sub(1)
                .and_then(|i| VIBRATION_TYPES.get(i))
            else {
                warn!("SYS: unknown vibration notification type {}", entry.notification_type);
                continue;
            };
            if !names.iter().any(|n| n == name) {
                names.push((*name).to_owned());
            }
            prefs.push((
                format!("{PREF_VIBRATION_PROFILE_PREFIX}{name}"),
                PrefValue::Text(entry.preset.to_string()),
            ));
        }
        prefs.push((PREF_VIBRATION_NOTIFICATION_TYPES.to_owned(), PrefValue::List(names)));

        let ids: Vec<String> = patterns.custom.iter().map(|p| p.id.to_string()).collect();
        let labels: Vec<String> = patterns.custom.iter().map(|p| p.name.replace(',', "")).collect();
        prefs.push((PREF_VIBRATION_PATTERN_IDS.to_owned(), PrefValue::Text(ids.join(","))));
        prefs.push((PREF_VIBRATION_PATTERN_NAMES.to_owned(), PrefValue::Text(labels.join(","))));

        out.emit(DeviceEvent::UpdatePreferences(prefs));
    }
}

impl Service for SystemService {
    fn command_type(&self) -> u8 {
        SYSTEM_COMMAND_TYPE
    }

    fn initialize(&mut self, ctx: &mut ServiceContext<'_>) {
        let out = &mut ctx.out;
        out.send("get device info", Command::request(SYSTEM_COMMAND_TYPE, CMD_DEVICE_INFO));
        out.send("get device status", Command::request(SYSTEM_COMMAND_TYPE, CMD_DEVICE_STATE_GET));
        // Fallback for models that never push device state.
        out.send("get battery state", Command::request(SYSTEM_COMMAND_TYPE, CMD_BATTERY));
        out.send("get password", Command::request(SYSTEM_COMMAND_TYPE, CMD_PASSWORD_GET));
        out.send("get display items", Command::request(SYSTEM_COMMAND_TYPE, CMD_DISPLAY_ITEMS_GET));
        out.send(
            "get vibration patterns",
            Command::request(SYSTEM_COMMAND_TYPE, CMD_VIBRATION_PATTERNS_GET),
        );
    }

    fn handle_command(&mut self, cmd: &Command, ctx: &mut ServiceContext<'_>) -> Result<(), LinkError> {
        let out = &mut ctx.out;
        match cmd.subtype {
            CMD_DEVICE_INFO => self.handle_device_info(&cmd.body, out),
            CMD_BATTERY => self.handle_battery(&cmd.body, out),
            CMD_FIRMWARE_INSTALL => self.handle_firmware_install(&cmd.body, out),
            CMD_PASSWORD_GET => self.handle_password(&cmd.body, out),
            CMD_FIND_PHONE => {
                let value = match cmd.body {
                    Body::System(SystemBody::FindDevice(value)) => value,
                    _ => 0,
                };
                debug!("SYS: find phone {value}");
                out.emit(DeviceEvent::FindPhone { start: value == 0 });
            }
            CMD_DISPLAY_ITEMS_GET => match &cmd.body {
                Body::System(SystemBody::DisplayItems(items)) => self.handle_display_items(items, out),
                _ => warn!("SYS: display items reply without body"),
            },
            CMD_VIBRATION_PATTERNS_GET => match &cmd.body {
                Body::System(SystemBody::VibrationPatterns(p)) => self.handle_vibration_patterns(p, out),
                _ => warn!("SYS: vibration patterns reply without body"),
            },
            CMD_DEVICE_STATE_GET => self.handle_basic_device_state(&cmd.body, out),
            CMD_DEVICE_STATE => self.handle_device_state(&cmd.body, out),
            CMD_CLOCK
            | CMD_LANGUAGE
            | CMD_FIND_WATCH
            | CMD_PASSWORD_SET
            | CMD_DISPLAY_ITEMS_SET
            | CMD_VIBRATION_PATTERNS_SET
            | CMD_VIBRATION_PATTERNS_DEL => debug!("SYS: ack for subtype {}", cmd.subtype),
            _ => {
                return Err(LinkError::UnknownCommand {
                    kind: cmd.kind,
                    subtype: cmd.subtype,
                });
            }
        }
        Ok(())
    }

    fn send_configuration(&mut self, key: &str, ctx: &mut ServiceContext<'_>) -> bool {
        match key {
            PREF_LANGUAGE => self.set_language(ctx),
            PREF_TIMEFORMAT => self.set_current_time(ctx),
            PREF_PASSWORD_ENABLED | PREF_PASSWORD => self.set_password(ctx),
            PREF_DISPLAY_ITEMS => self.set_display_items(ctx),
            _ => return false,
        }
        true
    }

    fn on_disconnect(&mut self) {
        self.reset_status();
        if self.install != InstallState::Idle {
            info!("SYS: dropping install on disconnect");
            self.install = InstallState::Idle;
        }
    }
}

fn system(subtype: u8, body: SystemBody) -> Command {
    Command::new(SYSTEM_COMMAND_TYPE, subtype, Body::System(body))
}

fn request_battery(out: &mut Outbox) {
    out.send("request battery state", Command::request(SYSTEM_COMMAND_TYPE, CMD_BATTERY));
}

/// Seconds → 15-minute units.
fn quarter_hours(secs: i32) -> i8 {
    (secs / 60 / 15) as i8
}
