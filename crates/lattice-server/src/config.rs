use anyhow::Result;
use lattice_core::RelaySettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub banshare: BanshareConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Bearer token for the gateway API.
    pub token: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/lattice.db?mode=rwc".into(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RelayConfig {
    /// The relay's own user id on the platform.
    pub relay_user_id: i64,
    #[serde(default = "default_display_name")]
    pub relay_display_name: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relay_user_id: 0,
            relay_display_name: default_display_name(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BanshareConfig {
    /// Channel where nominations are reviewed.
    pub review_channel_id: Option<i64>,
    #[serde(default = "default_quorum")]
    pub important_approval_quorum: u32,
    #[serde(default = "default_dialog_timeout")]
    pub dialog_step_timeout_secs: u64,
}

impl Default for BanshareConfig {
    fn default() -> Self {
        Self {
            review_channel_id: None,
            important_approval_quorum: default_quorum(),
            dialog_step_timeout_secs: default_dialog_timeout(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_display_name() -> String {
    "Lattice".into()
}

fn default_quorum() -> u32 {
    2
}

fn default_dialog_timeout() -> u64 {
    300
}

fn harden_secret_file_permissions(path: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{path}', generating defaults...");
            let config = Config::default();
            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string_pretty(&config)?)?;
            tracing::info!("Generated default config at '{path}'");
            config
        };
        let _ = harden_secret_file_permissions(path);

        // Environment variable overrides
        if let Ok(value) = std::env::var("LATTICE_GATEWAY_URL") {
            config.gateway.base_url = value;
        }
        if let Ok(value) = std::env::var("LATTICE_GATEWAY_TOKEN") {
            config.gateway.token = value;
        }
        if let Ok(value) = std::env::var("LATTICE_DATABASE_URL") {
            config.database.url = value;
        }

        Ok(config)
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            relay_user_id: self.relay.relay_user_id,
            relay_display_name: self.relay.relay_display_name.clone(),
            review_channel_id: self.banshare.review_channel_id,
            important_approval_quorum: self.banshare.important_approval_quorum,
            dialog_step_timeout: Duration::from_secs(self.banshare.dialog_step_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [gateway]
            base_url = "https://gw.example"
            token = "secret"

            [database]
            url = "sqlite::memory:"

            [relay]
            relay_user_id = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.relay.relay_display_name, "Lattice");
        assert_eq!(config.banshare.important_approval_quorum, 2);

        let settings = config.relay_settings();
        assert_eq!(settings.relay_user_id, 42);
        assert_eq!(settings.dialog_step_timeout, Duration::from_secs(300));
        assert_eq!(settings.review_channel_id, None);
    }

    #[test]
    fn banshare_section_round_trips() {
        let config: Config = toml::from_str(
            r#"
            [gateway]
            base_url = "https://gw.example"
            token = "secret"

            [database]
            url = "sqlite::memory:"

            [relay]
            relay_user_id = 42

            [banshare]
            review_channel_id = 500
            important_approval_quorum = 3
            dialog_step_timeout_secs = 60
            "#,
        )
        .unwrap();
        let settings = config.relay_settings();
        assert_eq!(settings.review_channel_id, Some(500));
        assert_eq!(settings.important_approval_quorum, 3);
        assert_eq!(settings.dialog_step_timeout, Duration::from_secs(60));
    }
}
