use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

const APP_DIR: &str = "sprinkler-gateway";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL of the web application the gateway sits in front of
  pub origin: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub notifications: NotificationConfig,
  #[serde(default)]
  pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Name of the current cache partition. Every other partition is pruned on activation.
  #[serde(default = "default_version")]
  pub version: String,
  /// Paths populated into the partition on install
  #[serde(default = "default_assets")]
  pub assets: Vec<String>,
  /// Request headers that take part in the request identity (case-insensitive)
  #[serde(default, deserialize_with = "deserialize_lowercase_vec")]
  pub vary_headers: Vec<String>,
  /// Database location (defaults to $XDG_DATA_HOME/sprinkler-gateway/cache.db)
  pub database: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_version(),
      assets: default_assets(),
      vary_headers: Vec::new(),
      database: None,
    }
  }
}

fn default_version() -> String {
  "sprinkler-app-v1".to_string()
}

fn default_assets() -> Vec<String> {
  ["/", "/src/main.tsx", "/src/index.css", "/manifest.json"]
    .into_iter()
    .map(String::from)
    .collect()
}

fn deserialize_lowercase_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Deferred-sync tag that triggers zone operation replay
  #[serde(default = "default_sync_tag")]
  pub tag: String,
  /// Prefix prepended to every pending operation endpoint
  #[serde(default = "default_api_prefix")]
  pub api_prefix: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: default_sync_tag(),
      api_prefix: default_api_prefix(),
    }
  }
}

fn default_sync_tag() -> String {
  "zone-control".to_string()
}

fn default_api_prefix() -> String {
  "/api".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  /// Body used when a push arrives without a payload
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub require_interaction: bool,
  pub open_zones_title: String,
  pub dismiss_title: String,
  /// Opened when the "open-zones" action is clicked
  pub zones_url: String,
  /// Opened for any other click
  pub root_url: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "System Nawadniania".to_string(),
      default_body: "Sprawdź status nawadniania".to_string(),
      icon: "/manifest-icon-192.png".to_string(),
      badge: "/manifest-icon-96.png".to_string(),
      tag: "sprinkler-notification".to_string(),
      require_interaction: true,
      open_zones_title: "Otwórz strefy".to_string(),
      dismiss_title: "Zamknij".to_string(),
      zones_url: "/?section=zones".to_string(),
      root_url: "/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sprinkler-gateway.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sprinkler-gateway/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/sprinkler-gateway/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("sprinkler-gateway.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_DIR).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to load config file {}: {}", path.display(), e))
  }

  /// Parse and validate configuration from a YAML string.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;

    config.origin_url()?;
    if config.cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }

    Ok(config)
  }

  /// The configured origin as a parsed URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Path of the cache database.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.cache.database {
      Some(path) => Ok(path.clone()),
      None => Ok(data_dir()?.join("cache.db")),
    }
  }
}

/// Application data directory, used for the cache database and the log file.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join(APP_DIR))
}
