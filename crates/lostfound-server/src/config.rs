//! Configuration management for the bot server

use anyhow::{Context, Result};
use lostfound::config::{default_cities, DialogConfig};
use lostfound::services::WeComCredentials;
use serde::Deserialize;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 8888)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database URL (default: sqlite:./data/lostfound.db?mode=rwc)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum database connections (default: 5)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// WeCom corp id; the callback's receiver
    #[serde(default)]
    pub corp_id: String,

    /// Application secret used to fetch access tokens
    #[serde(default)]
    pub corp_secret: String,

    #[serde(default)]
    pub agent_id: i64,

    /// Callback token for signature verification. Unset disables verification.
    pub token: Option<String>,

    /// Callback AES key. Only plaintext callbacks are handled by the shipped codec.
    pub encoding_aes_key: Option<String>,

    /// WeCom API base (default: https://qyapi.weixin.qq.com)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Cities accepted at the city stage
    #[serde(default = "default_cities")]
    pub cities: Vec<String>,

    /// Directory confirmed pictures are stored in and served from (default: imgs)
    #[serde(default = "default_image_dir")]
    pub image_dir: String,

    /// Public base URL used in image links (e.g., https://bot.example.com)
    pub public_base_url: Option<String>,

    /// Sessions idle longer than this are dropped (default: 1800)
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,

    /// How often the idle sweep runs (default: 60)
    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,

    /// Push delivery attempts (default: 3)
    #[serde(default = "default_push_max_attempts")]
    pub push_max_attempts: u32,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_database_url() -> String {
    "sqlite:./data/lostfound.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_api_base() -> String {
    "https://qyapi.weixin.qq.com".to_string()
}

fn default_image_dir() -> String {
    "imgs".to_string()
}

fn default_session_idle_timeout_secs() -> u64 {
    1800
}

fn default_session_sweep_interval_secs() -> u64 {
    60
}

fn default_push_max_attempts() -> u32 {
    3
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("LOSTFOUND_HOST").unwrap_or_else(|_| default_host());
        let port = parse_env("LOSTFOUND_PORT").unwrap_or_else(default_port);
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| default_database_url());
        let max_connections =
            parse_env("DATABASE_MAX_CONNECTIONS").unwrap_or_else(default_max_connections);
        let corp_id = std::env::var("WECOM_CORP_ID").unwrap_or_default();
        let corp_secret = std::env::var("WECOM_CORP_SECRET").unwrap_or_default();
        let agent_id = match std::env::var("WECOM_AGENT_ID") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid WECOM_AGENT_ID '{}'", raw))?,
            Err(_) => 0,
        };
        let token = std::env::var("WECOM_TOKEN").ok().filter(|s| !s.is_empty());
        let encoding_aes_key = std::env::var("WECOM_ENCODING_AES_KEY")
            .ok()
            .filter(|s| !s.is_empty());
        let api_base = std::env::var("WECOM_API_BASE").unwrap_or_else(|_| default_api_base());
        let cities = match std::env::var("LOSTFOUND_CITIES") {
            Ok(raw) => {
                let cities: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if cities.is_empty() {
                    anyhow::bail!("LOSTFOUND_CITIES is set but lists no city");
                }
                cities
            }
            Err(_) => default_cities(),
        };
        let image_dir = std::env::var("IMAGE_DIR").unwrap_or_else(|_| default_image_dir());
        let public_base_url = std::env::var("PUBLIC_BASE_URL").ok();
        let session_idle_timeout_secs = parse_env("SESSION_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(default_session_idle_timeout_secs);
        let session_sweep_interval_secs = parse_env("SESSION_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(default_session_sweep_interval_secs);
        let push_max_attempts =
            parse_env("PUSH_MAX_ATTEMPTS").unwrap_or_else(default_push_max_attempts);

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            corp_id,
            corp_secret,
            agent_id,
            token,
            encoding_aes_key,
            api_base,
            cities,
            image_dir,
            public_base_url,
            session_idle_timeout_secs,
            session_sweep_interval_secs,
            push_max_attempts,
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Whether pushes can actually be delivered
    pub fn has_credentials(&self) -> bool {
        !self.corp_id.is_empty() && !self.corp_secret.is_empty()
    }

    pub fn credentials(&self) -> WeComCredentials {
        WeComCredentials {
            api_base: self.api_base.clone(),
            corp_id: self.corp_id.clone(),
            corp_secret: self.corp_secret.clone(),
            agent_id: self.agent_id,
        }
    }

    /// Dialog settings handed to the conversation engine
    pub fn dialog_config(&self) -> DialogConfig {
        let base_url = self
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port));
        DialogConfig::new()
            .with_cities(self.cities.clone())
            .with_image_base_url(base_url)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            corp_id: String::new(),
            corp_secret: String::new(),
            agent_id: 0,
            token: None,
            encoding_aes_key: None,
            api_base: default_api_base(),
            cities: default_cities(),
            image_dir: default_image_dir(),
            public_base_url: None,
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            session_sweep_interval_secs: default_session_sweep_interval_secs(),
            push_max_attempts: default_push_max_attempts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lostfound.toml");
        std::fs::write(
            &path,
            "port = 9000\ncorp_id = \"ww1\"\ncorp_secret = \"s\"\ncities = [\"杭州\", \"深圳\"]\n",
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.session_idle_timeout_secs, 1800);
        assert_eq!(config.push_max_attempts, 3);
        assert!(config.has_credentials());
        assert!(config.dialog_config().is_known_city("深圳"));
        assert!(!config.dialog_config().is_known_city("上海"));
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file("/nonexistent/lostfound.toml").is_err());
    }

    #[test]
    fn test_image_base_defaults_to_listen_address() {
        let config = Config::default();
        assert!(!config.has_credentials());
        assert_eq!(
            config.dialog_config().image_link("a.png"),
            "http://127.0.0.1:8888/api/bot/imgs/a.png"
        );
    }
}
