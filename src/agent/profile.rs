//! The logged-in user's profile record.

use crate::config::SettingsConfig;
use canoe_core::{Mute, Petname, Relay};
use nostr_sdk::{Event, Metadata};
use serde::{Deserialize, Serialize};

/// User preferences, synced to relays encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub relay_limit: u32,
    pub default_zap: u64,
    pub show_media: bool,
    pub report_analytics: bool,
    #[serde(default)]
    pub dufflepud_url: Option<String>,
    #[serde(default)]
    pub multiplextr_url: Option<String>,
}

impl Settings {
    pub fn from_config(config: &SettingsConfig) -> Self {
        Self {
            relay_limit: config.relay_limit,
            default_zap: config.default_zap,
            show_media: config.show_media,
            report_analytics: config.report_analytics,
            dufflepud_url: config.dufflepud_url.clone(),
            multiplextr_url: config.multiplextr_url.clone(),
        }
    }

    /// One setting by its serialized name (e.g. `"showMedia"`).
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match serde_json::to_value(self).ok()? {
            serde_json::Value::Object(mut map) => map.remove(key),
            _ => None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&SettingsConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub pubkey: Option<String>,
    #[serde(default)]
    pub kind0: Option<Metadata>,
    #[serde(default)]
    pub lnurl: Option<String>,
    #[serde(default)]
    pub zapper: Option<String>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub petnames: Vec<Petname>,
    #[serde(default)]
    pub relays: Vec<Relay>,
    #[serde(default)]
    pub mutes: Vec<Mute>,
    /// The user's kind 30001 list events.
    #[serde(default)]
    pub lists: Vec<Event>,
}

impl Profile {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn write_relays(&self) -> impl Iterator<Item = &Relay> {
        self.relays.iter().filter(|r| r.write)
    }
}
