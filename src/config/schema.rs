//! Configuration types for canoe.
//!
//! Every section has defaults so an empty file (or no file at all) yields a
//! usable anonymous client.

use serde::{Deserialize, Serialize};

// ── Identity ────────────────────────────────────────────────────

/// Default config directory name under `$HOME` when no platform data dir exists.
pub const APP_DIR_NAME: &str = ".canoe";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Secret key (nsec1... or hex). Can also be set via CANOE_NSEC env var.
    #[serde(default)]
    pub nsec: Option<String>,
    /// File containing the secret key, either bare or as `{"nsec": "..."}`.
    #[serde(default)]
    pub nsec_file: Option<String>,
    /// Public key (npub1... or hex) for read-only use.
    #[serde(default)]
    pub pubkey: Option<String>,
}

// ── User settings defaults ──────────────────────────────────────

/// Initial values for the user's settings before any are loaded from relays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_relay_limit")]
    pub relay_limit: u32,
    #[serde(default = "default_zap")]
    pub default_zap: u64,
    #[serde(default = "default_true")]
    pub show_media: bool,
    #[serde(default = "default_true")]
    pub report_analytics: bool,
    /// Link preview / helper service base URL. Env: CANOE_DUFFLEPUD_URL.
    #[serde(default)]
    pub dufflepud_url: Option<String>,
    /// Relay multiplexer URL. Env: CANOE_MULTIPLEXTR_URL.
    #[serde(default)]
    pub multiplextr_url: Option<String>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            relay_limit: default_relay_limit(),
            default_zap: default_zap(),
            show_media: true,
            report_analytics: true,
            dufflepud_url: None,
            multiplextr_url: None,
        }
    }
}

fn default_relay_limit() -> u32 {
    20
}

fn default_zap() -> u64 {
    21
}

fn default_true() -> bool {
    true
}

// ── Theme ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Light palette as `name:value,name:value`.
    #[serde(default = "default_theme_light")]
    pub light: String,
    /// Dark palette as `name:value,name:value`.
    #[serde(default = "default_theme_dark")]
    pub dark: String,
    /// Theme used until the user picks one: "light" | "dark"
    #[serde(default = "default_theme_name")]
    pub default: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            light: default_theme_light(),
            dark: default_theme_dark(),
            default: default_theme_name(),
        }
    }
}

fn default_theme_light() -> String {
    "gray-1:#FFFFFF,gray-2:#FAF6F1,gray-3:#F2EBE1,gray-4:#E9E0D3,accent:#EB5E28,danger:#ff0000".into()
}

fn default_theme_dark() -> String {
    "gray-1:#0F0F0E,gray-2:#1A1B1E,gray-3:#2C2E33,gray-4:#41454D,accent:#EB5E28,danger:#ff0000".into()
}

fn default_theme_name() -> String {
    "dark".into()
}

// ── Storage / logging / routes ──────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where persisted state lives. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Prefix of profile links in rendered notes.
    #[serde(default = "default_person_prefix")]
    pub person_prefix: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            person_prefix: default_person_prefix(),
        }
    }
}

fn default_person_prefix() -> String {
    "/p/".into()
}

pub fn default_relays() -> Vec<String> {
    vec![
        "wss://relay.damus.io".to_string(),
        "wss://nos.lol".to_string(),
        "wss://relay.primal.net".to_string(),
        "wss://relay.snort.social".to_string(),
    ]
}
