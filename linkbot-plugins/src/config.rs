//! Bot configuration.
//!
//! Loaded once at startup from `~/.config/linkbot/linkbot.toml` (or the path
//! given with `--config`), then shared read-only with every plugin.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default shortening threshold, in bytes of URL.
pub const DEFAULT_SHORTEN_THRESHOLD: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("bad config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name used to key stored URLs; one bot may serve several networks.
    pub network: String,
    /// Server address (host:port).
    pub server: String,
    pub tls: bool,
    pub password: Option<String>,
    pub nick: String,
    pub realname: String,
    /// Channels to join after registration.
    pub channels: Vec<String>,
    pub command_prefix: String,
    /// SQLite database for the URL registry.
    pub database: PathBuf,
    pub http: HttpConfig,
    pub shortener: ShortenerConfig,
    pub weather: WeatherConfig,
    pub plugins: PluginsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: "libera".to_string(),
            server: "irc.libera.chat:6697".to_string(),
            tls: true,
            password: None,
            nick: "linkbot".to_string(),
            realname: "linkbot".to_string(),
            channels: vec!["#linkbot".to_string()],
            command_prefix: ".".to_string(),
            database: default_database_path(),
            http: HttpConfig::default(),
            shortener: ShortenerConfig::default(),
            weather: WeatherConfig::default(),
            plugins: PluginsConfig::default(),
        }
    }
}

/// Outbound HTTP settings shared by every plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Some sites reject the default reqwest agent.
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Stop reading a response body after this many bytes.
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 10,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortenerConfig {
    /// is.gd-compatible endpoint taking `format=simple&url=...`.
    pub endpoint: String,
    /// URLs strictly longer than this are shortened.
    pub threshold: usize,
    /// Show the long URL instead of an error when shortening fails.
    pub fallback_to_long_url: bool,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://is.gd/create.php".to_string(),
            threshold: DEFAULT_SHORTEN_THRESHOLD,
            fallback_to_long_url: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// OpenWeatherMap API key.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub default_city: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            default_city: "Helsinki,Finland".to_string(),
        }
    }
}

/// Which plugins to load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub urlnazi: bool,
    /// Title-only variant of urlnazi; usually only one of the two is enabled.
    pub pagetitle: bool,
    pub weather: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            urlnazi: true,
            pagetitle: false,
            weather: true,
        }
    }
}

impl PluginsConfig {
    /// Both URL plugins hook the same pattern, and each stays silent for URLs
    /// another plugin claims, so together neither replies.
    pub fn url_plugins_overlap(&self) -> bool {
        self.urlnazi && self.pagetitle
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("linkbot")
}

/// Where the config file is looked up when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    config_dir().join("linkbot.toml")
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("linkbot")
        .join("linkbot.db")
}

impl Config {
    /// Parse a config from TOML text. Missing keys take their defaults.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load from an explicit path; the file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Load from `path` if given, otherwise from the default location,
    /// falling back to built-in defaults when that file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        let path = default_config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }
}
