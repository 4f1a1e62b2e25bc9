//! Configuration module for Outreach

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const EMAIL_API_KEY_ENV: &str = "OUTREACH_EMAIL_API_KEY";
const WHATSAPP_TOKEN_ENV: &str = "OUTREACH_WHATSAPP_TOKEN";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Message dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Email transport
    #[serde(default)]
    pub email: EmailConfig,

    /// WhatsApp transport
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Storefront links
    #[serde(default)]
    pub storefront: StorefrontConfig,

    /// Log output
    #[serde(default)]
    pub log: LogConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Path to SQLite database
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn get_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            PathBuf::from(path)
        } else {
            get_data_dir().join("outreach.db")
        }
    }
}

/// Dispatcher limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum rows claimed per dispatch call
    #[serde(default = "default_batch_limit")]
    pub batch_limit: i64,

    /// Per-send timeout in seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Sends in flight at once within a batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Age after which a `sending` row is considered abandoned
    #[serde(default = "default_stale_claim")]
    pub stale_claim_secs: i64,
}

fn default_batch_limit() -> i64 {
    200
}
fn default_send_timeout() -> u64 {
    15
}
fn default_concurrency() -> usize {
    4
}
fn default_stale_claim() -> i64 {
    900
}

impl DispatchConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            send_timeout_secs: default_send_timeout(),
            concurrency: default_concurrency(),
            stale_claim_secs: default_stale_claim(),
        }
    }
}

/// Transactional email HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,

    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Subject template used when the campaign has none
    #[serde(default = "default_subject")]
    pub default_subject: String,

    /// Body template used when the campaign has none
    #[serde(default = "default_body")]
    pub default_body: String,
}

fn default_from_address() -> String {
    "no-reply@example.com".to_string()
}
fn default_from_name() -> String {
    "Parts Store".to_string()
}
fn default_subject() -> String {
    "{{campaign}}".to_string()
}
fn default_body() -> String {
    "<p>Hi {{name}},</p><p>{{campaign}}</p><p>{{offer}}</p><p><a href=\"{{link}}\">Take a look</a></p>"
        .to_string()
}

impl EmailConfig {
    /// Transport is usable only with an endpoint and a key
    pub fn is_configured(&self) -> bool {
        self.api_url.as_deref().is_some_and(|u| !u.is_empty())
            && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from_address: default_from_address(),
            from_name: default_from_name(),
            default_subject: default_subject(),
            default_body: default_body(),
        }
    }
}

/// WhatsApp Cloud API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_whatsapp_api_url")]
    pub api_url: String,
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
}

fn default_whatsapp_api_url() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

impl WhatsAppConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_url.is_empty()
            && self.access_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.phone_number_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_url: default_whatsapp_api_url(),
            access_token: None,
            phone_number_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontConfig {
    /// Base URL used when rendering links in messages
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Get the data directory for Outreach
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("outreach"))
        .or_else(|| dirs::home_dir().map(|h| h.join(".outreach")))
        .unwrap_or_else(|| PathBuf::from(".outreach"))
}

/// Get the config directory for Outreach
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("outreach"))
        .unwrap_or_else(get_data_dir)
}

/// Load configuration from `path`, or from the default location, or defaults.
///
/// Secrets may come from the environment instead of the file.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| get_config_dir().join("config.toml"));

    let mut config = if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %config_path.display(), "Invalid config file, using defaults: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %config_path.display(), "Unreadable config file, using defaults: {}", e);
                Config::default()
            }
        }
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    config
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var(EMAIL_API_KEY_ENV) {
        config.email.api_key = Some(key);
    }
    if let Ok(token) = std::env::var(WHATSAPP_TOKEN_ENV) {
        config.whatsapp.access_token = Some(token);
    }
}

/// Save configuration to file
pub fn save_config(config: &Config) -> std::io::Result<()> {
    let config_dir = get_config_dir();
    std::fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.toml");
    let contents = toml::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(config_path, contents)?;

    Ok(())
}
