//! Loading and validating `canoe.toml`.

pub mod schema;

pub use schema::{
    default_relays, IdentityConfig, LoggingConfig, RoutesConfig, SettingsConfig, StorageConfig,
    ThemeConfig, APP_DIR_NAME,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Relays used while no user relay list is known.
    #[serde(default = "default_relays")]
    pub relays: Vec<String>,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            relays: default_relays(),
            settings: SettingsConfig::default(),
            theme: ThemeConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            routes: RoutesConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(path);
        let content = fs::read_to_string(expanded_path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env();
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(path);
        if Path::new(expanded_path.as_ref()).exists() {
            return Self::load_from_file(path);
        }
        let mut config = Config::default();
        config.apply_env();
        Ok(config)
    }

    /// Environment variables fill in values the file leaves unset.
    fn apply_env(&mut self) {
        if self.identity.nsec.is_none() {
            if let Ok(nsec) = std::env::var("CANOE_NSEC") {
                self.identity.nsec = Some(nsec);
            }
        }
        if self.settings.dufflepud_url.is_none() {
            if let Ok(url) = std::env::var("CANOE_DUFFLEPUD_URL") {
                self.settings.dufflepud_url = Some(url);
            }
        }
        if self.settings.multiplextr_url.is_none() {
            if let Ok(url) = std::env::var("CANOE_MULTIPLEXTR_URL") {
                self.settings.multiplextr_url = Some(url);
            }
        }
    }

    /// Secret key from `nsec` or `nsec_file`, if either is configured.
    pub fn load_secret(&self) -> Result<Option<String>> {
        if let Some(nsec) = &self.identity.nsec {
            return Ok(Some(nsec.trim().to_string()));
        }
        let Some(file) = &self.identity.nsec_file else {
            return Ok(None);
        };

        let expanded_path = shellexpand::tilde(file);
        let content = fs::read_to_string(expanded_path.as_ref())
            .with_context(|| format!("Failed to read identity file: {}", file))?;
        let content = content.trim();

        if content.starts_with('{') {
            let json: serde_json::Value =
                serde_json::from_str(content).with_context(|| "Failed to parse identity JSON")?;
            let nsec = json
                .get("nsec")
                .and_then(|v| v.as_str())
                .with_context(|| "Identity file must contain 'nsec' field")?;
            return Ok(Some(nsec.to_string()));
        }

        Ok(Some(content.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        for relay in &self.relays {
            if !relay.starts_with("wss://") && !relay.starts_with("ws://") {
                anyhow::bail!("Relay URL must start with ws:// or wss://: {}", relay);
            }
        }

        if let Some(url) = &self.settings.multiplextr_url {
            if !url.starts_with("wss://") && !url.starts_with("ws://") {
                anyhow::bail!("Multiplexer URL must start with ws:// or wss://");
            }
        }

        if let Some(url) = &self.settings.dufflepud_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("Dufflepud URL must start with http:// or https://");
            }
        }

        if !matches!(self.theme.default.as_str(), "light" | "dark") {
            anyhow::bail!("Theme default must be \"light\" or \"dark\"");
        }

        Ok(())
    }

    pub fn expand_paths(&mut self) -> Result<()> {
        if let Some(file) = &self.identity.nsec_file {
            self.identity.nsec_file = Some(shellexpand::tilde(file).to_string());
        }
        if let Some(dir) = &self.storage.data_dir {
            self.storage.data_dir = Some(shellexpand::tilde(dir).to_string());
        }
        Ok(())
    }

    /// Directory for persisted state.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.storage.data_dir {
            return PathBuf::from(shellexpand::tilde(dir).as_ref());
        }
        directories::ProjectDirs::from("", "", "canoe")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| {
                let home = shellexpand::tilde("~").to_string();
                PathBuf::from(home).join(APP_DIR_NAME)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.relays, default_relays());
        assert_eq!(config.settings.relay_limit, 20);
        assert_eq!(config.settings.default_zap, 21);
        assert!(config.settings.show_media);
        assert_eq!(config.theme.default, "dark");
        assert_eq!(config.routes.person_prefix, "/p/");
        config.validate().unwrap();
    }

    #[test]
    fn partial_config() {
        let toml_str = r#"
relays = ["wss://relay.example.com"]

[settings]
dufflepud_url = "https://dufflepud.example.com"

[theme]
default = "light"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.relays, vec!["wss://relay.example.com"]);
        assert_eq!(
            config.settings.dufflepud_url.as_deref(),
            Some("https://dufflepud.example.com")
        );
        assert_eq!(config.theme.default, "light");
        config.validate().unwrap();
    }

    #[test]
    fn rejects_http_relay() {
        let config = Config {
            relays: vec!["https://relay.example.com".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_theme() {
        let mut config = Config::default();
        config.theme.default = "sepia".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn secret_from_json_identity_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, r#"{"nsec": "nsec1example"}"#).unwrap();

        let mut config = Config::default();
        config.identity.nsec_file = Some(path.display().to_string());
        assert_eq!(config.load_secret().unwrap().as_deref(), Some("nsec1example"));
    }

    #[test]
    fn secret_from_bare_identity_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nsec");
        fs::write(&path, "nsec1bare\n").unwrap();

        let mut config = Config::default();
        config.identity.nsec_file = Some(path.display().to_string());
        assert_eq!(config.load_secret().unwrap().as_deref(), Some("nsec1bare"));
    }

    #[test]
    fn data_dir_override() {
        let mut config = Config::default();
        config.storage.data_dir = Some("/tmp/canoe-test".into());
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/canoe-test"));
    }
}
