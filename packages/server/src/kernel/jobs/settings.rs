//! The transfer policy document: concurrency, retry, naming templates,
//! privacy, gear linkage. Persisted as a single versioned JSON row; the
//! validation/normalization/preview logic lives in
//! `domains::transfer::settings_service` (business logic, not persistence).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SETTINGS_VERSION: i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: i32,
    pub base_delay_seconds: f64,
    pub max_delay_seconds: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_seconds: 1.0,
            max_delay_seconds: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingSettings {
    pub title_template: String,
    pub description_template: String,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            title_template: "{sport} {start_local:%Y-%m-%d %H:%M}".to_string(),
            description_template: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Default,
    Private,
    Public,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Default
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrivacySettings {
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GearSettings {
    pub enabled: bool,
    pub gear_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub version: i32,
    pub concurrency: i32,
    pub retry: RetrySettings,
    pub naming: NamingSettings,
    pub privacy: PrivacySettings,
    /// Vendor sport code -> display name override. Empty means "use the
    /// bundled default table" (see `domains::transfer::sport_codes`).
    pub sport_mapping: HashMap<i32, String>,
    pub gear: GearSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            concurrency: 2,
            retry: RetrySettings::default(),
            naming: NamingSettings::default(),
            privacy: PrivacySettings::default(),
            sport_mapping: HashMap::new(),
            gear: GearSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.concurrency, 2);
        assert_eq!(s.retry.max_attempts, 3);
        assert_eq!(s.retry.base_delay_seconds, 1.0);
        assert_eq!(s.retry.max_delay_seconds, 60.0);
        assert_eq!(s.privacy.visibility, Visibility::Default);
        assert!(!s.gear.enabled);
        assert_eq!(s.version, SETTINGS_VERSION);
    }
}
