use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::http::Request;

/// Resources fetched into the static generation at install.
pub const DEFAULT_MANIFEST: &[&str] = &[
  "/",
  "/index.html",
  "/main.css",
  "/logic.js",
  "/poems.js",
  "/manifest.json",
  "/bgimg.png",
];

/// Environment variable that overrides the configured cache version.
pub const VERSION_ENV: &str = "VERSO_VERSION";

pub const LOG_FILE: &str = "verso.log";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL of the reading app; manifest paths resolve against it
  pub origin: String,
  /// Cache version; bumping it installs fresh generations and evicts the old
  pub version: String,
  pub manifest: Vec<String>,
  /// Where the store, cache and log live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
  /// Start with connectivity reported as offline
  pub offline: bool,
  /// Activate right after install instead of waiting for SKIP_WAITING
  pub skip_waiting: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      version: "v1".to_string(),
      manifest: DEFAULT_MANIFEST.iter().map(|p| p.to_string()).collect(),
      data_dir: None,
      offline: false,
      skip_waiting: true,
    }
  }
}

impl Config {
  /// Load configuration from file, falling back to defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./verso.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/verso/config.yaml
  ///
  /// `VERSO_VERSION` overrides `version` afterwards.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    let config = config.with_version_override(std::env::var(VERSION_ENV).ok());
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("verso.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("verso").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn with_version_override(self, version: Option<String>) -> Self {
    match version.filter(|v| !v.trim().is_empty()) {
      Some(version) => Config { version, ..self },
      None => self,
    }
  }

  fn validate(&self) -> Result<()> {
    let origin = self.origin_url()?;
    if !matches!(origin.scheme(), "http" | "https") {
      return Err(eyre!("origin must be an http(s) URL, got {}", self.origin));
    }
    // Generation names are "<kind>-<version>"; whitespace would not survive.
    if self.version.is_empty() || self.version.chars().any(char::is_whitespace) {
      return Err(eyre!("Invalid cache version {:?}", self.version));
    }
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))
  }

  /// Manifest paths resolved against the origin.
  pub fn manifest_requests(&self) -> Result<Vec<Request>> {
    let origin = self.origin_url()?;
    self
      .manifest
      .iter()
      .map(|path| {
        Request::resolve(&origin, path).map_err(|e| eyre!("Invalid manifest entry {}: {}", path, e))
      })
      .collect()
  }

  pub fn data_dir(&self) -> PathBuf {
    self.data_dir.clone().unwrap_or_else(|| {
      dirs::data_dir()
        .map(|dir| dir.join("verso"))
        .unwrap_or_else(|| PathBuf::from(".verso"))
    })
  }

  /// Key-value store for feature state, queues and the registration.
  pub fn store_path(&self) -> PathBuf {
    self.data_dir().join("store.db")
  }

  pub fn cache_path(&self) -> PathBuf {
    self.data_dir().join("cache.db")
  }
}
