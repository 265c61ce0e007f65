use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::worker::DynamicCacheRule;

/// Base version tag; generation names are derived from it.
pub const DEFAULT_VERSION: &str = "subway-report-v1.0.0";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
  #[serde(default)]
  pub worker: WorkerConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
  /// Version tag. Bumping it purges every older generation on activation.
  pub version: String,
  /// Origin the worker is installed for; relative URLs resolve against it
  pub origin: String,
  /// URLs fetched and stored at install time, in order
  pub precache: Vec<String>,
  /// Application shell served for offline navigations
  pub shell: String,
  /// Path of the dataset resource
  pub dataset: String,
  /// Which fetched responses are kept in the dynamic generation, written as
  /// `- extension: js` or `- prefix: "https://cdn."`
  #[serde(deserialize_with = "serde_yaml::with::singleton_map_recursive::deserialize")]
  pub rules: Vec<DynamicCacheRule>,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      version: DEFAULT_VERSION.to_string(),
      origin: "http://localhost:8080".to_string(),
      precache: [
        "/",
        "/src/index.html",
        "/src/css/main.css",
        "/src/css/components.css",
        "/src/js/app.js",
        "/src/js/data.js",
        "/src/js/sms.js",
        "/data/subway-lines.json",
        "/public/manifest.json",
        "https://fonts.googleapis.com/css2?family=Noto+Sans+KR:wght@300;400;500;700&display=swap",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      shell: "/src/index.html".to_string(),
      dataset: "/data/subway-lines.json".to_string(),
      rules: DynamicCacheRule::defaults(),
    }
  }
}

impl WorkerConfig {
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a possibly relative URL against the origin.
  pub fn resolve(&self, url: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(url)
      .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))
  }

  /// Substring identifying dataset requests: the dataset's file name.
  pub fn dataset_marker(&self) -> &str {
    self
      .dataset
      .rsplit('/')
      .next()
      .filter(|name| !name.is_empty())
      .unwrap_or(&self.dataset)
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
  /// Persistent SQLite database
  #[default]
  Sqlite,
  /// Process-local, gone on exit
  Memory,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StorageConfig {
  #[serde(default)]
  pub backend: StorageBackend,
  /// Database path (default: $XDG_DATA_HOME/subway-worker/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Also write logs to this file
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file, falling back to built-in defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./subway-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/subway-worker/config.yaml
  ///
  /// `SUBWAY_WORKER_VERSION` overrides the version tag.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(version) = std::env::var("SUBWAY_WORKER_VERSION") {
      if !version.trim().is_empty() {
        config.worker.version = version.trim().to_string();
      }
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("subway-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("subway-worker").join("config.yaml");
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
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  fn validate(&self) -> Result<()> {
    if self.worker.version.trim().is_empty() {
      return Err(eyre!("worker.version must not be empty"));
    }
    self.worker.origin_url()?;
    for url in &self.worker.precache {
      self.worker.resolve(url)?;
    }
    Ok(())
  }
}
