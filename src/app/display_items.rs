//! Display-item (watch menu) translation.
//!
//! The watch describes its menu as a flat list of items, each enabled or
//! disabled and each either on the main screen or inside the "more"
//! section. The host edits it as one ordered list of enabled codes where
//! the `more` sentinel separates the two sections.
//!
//! ```text
//! device: [a, b(more), c(disabled), s(settings)]
//! host:   enabled = a,s,more,b   all = a,b,c,s,more
//! ```

use std::collections::HashMap;

use super::commands::DisplayItem;

/// Sentinel code splitting main and more-section entries.
pub const MORE: &str = "more";

/// Host view of the watch menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayItemPrefs {
    /// Every code, followed by [`MORE`].
    pub all_codes: Vec<String>,
    /// Labels parallel to `all_codes`, commas removed.
    pub all_labels: Vec<String>,
    /// Main entries, then [`MORE`] and the more-section entries if any.
    pub enabled: Vec<String>,
    pub settings_code: Option<String>,
}

/// Device list → host view. `more_label` is the localized section name.
pub fn to_prefs(items: &[DisplayItem], more_label: &str) -> DisplayItemPrefs {
    let mut all_codes = Vec::with_capacity(items.len() + 1);
    let mut all_labels = Vec::with_capacity(items.len() + 1);
    let mut main = Vec::new();
    let mut more = Vec::new();
    let mut settings_code = None;

    for item in items {
        all_codes.push(item.code.clone());
        all_labels.push(item.name.replace(',', ""));
        if !item.disabled {
            if item.in_more_section {
                more.push(item.code.clone());
            } else {
                main.push(item.code.clone());
            }
        }
        if item.is_settings {
            settings_code = Some(item.code.clone());
        }
    }

    let mut enabled = main;
    if !more.is_empty() {
        enabled.push(MORE.to_owned());
        enabled.extend(more);
    }
    all_codes.push(MORE.to_owned());
    all_labels.push(more_label.replace(',', ""));

    DisplayItemPrefs {
        all_codes,
        all_labels,
        enabled,
        settings_code,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildError {
    /// No code list has been learned from the device yet.
    NoCodes,
    /// Code and label lists differ in length.
    Mismatched { codes: usize, labels: usize },
}

/// Host view → device list.
///
/// Enabled codes keep their order. A settings code left out of the enabled
/// list is appended. Codes with no label are skipped. Every other known
/// code is sent as disabled.
pub fn from_prefs(prefs: &DisplayItemPrefs) -> Result<Vec<DisplayItem>, RebuildError> {
    if prefs.all_codes.is_empty() {
        return Err(RebuildError::NoCodes);
    }
    if prefs.all_codes.len() != prefs.all_labels.len() {
        return Err(RebuildError::Mismatched {
            codes: prefs.all_codes.len(),
            labels: prefs.all_labels.len(),
        });
    }

    let labels: HashMap<&str, &str> = prefs
        .all_codes
        .iter()
        .map(String::as_str)
        .zip(prefs.all_labels.iter().map(String::as_str))
        .collect();

    let mut enabled: Vec<&str> = prefs.enabled.iter().map(String::as_str).collect();
    let settings = prefs.settings_code.as_deref();
    if let Some(code) = settings {
        if !enabled.contains(&code) {
            enabled.push(code);
        }
    }

    let mut items = Vec::with_capacity(prefs.all_codes.len());
    let mut in_more_section = false;
    for code in &enabled {
        if *code == MORE {
            in_more_section = true;
            continue;
        }
        let Some(label) = labels.get(code) else {
            continue;
        };
        items.push(DisplayItem {
            code: (*code).to_owned(),
            name: (*label).to_owned(),
            disabled: false,
            in_more_section,
            is_settings: settings == Some(*code),
        });
    }

    for (code, label) in prefs.all_codes.iter().zip(&prefs.all_labels) {
        if code == MORE || enabled.contains(&code.as_str()) {
            continue;
        }
        items.push(DisplayItem {
            code: code.clone(),
            name: label.clone(),
            disabled: true,
            in_more_section: false,
            is_settings: false,
        });
    }

    Ok(items)
}
