use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Worker configuration, fixed for the lifetime of the worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Name of the current cache generation
  pub version: String,
  /// Origin the worker is registered on; relative URLs resolve against it
  pub origin: String,
  /// Document served to HTML navigations that fail with no cached copy
  pub offline_url: String,
  /// Resources fetched and stored at install time
  pub precache: Vec<String>,
  /// Hosts that always go to the network (substring match on the URL host)
  pub live_hosts: Vec<String>,
  /// Directory for the SQLite database and log files
  pub data_dir: Option<PathBuf>,
  pub sync: SyncConfig,
  pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Endpoint each queued item is POSTed to
  pub endpoint: String,
  /// Tag of the one-off sync registration that drains the queue
  pub tag: String,
  /// Tag of the periodic sync registration that drains the queue
  pub periodic_tag: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub open_title: String,
  pub close_title: String,
  /// Page opened when a notification is clicked
  pub open_url: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      version: "water-system-v1.0.0".to_string(),
      origin: "http://localhost:8080".to_string(),
      offline_url: "/offline.html".to_string(),
      precache: [
        "/",
        "/index.html",
        "/manifest.json",
        "/offline.html",
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.2/css/all.min.css",
        "https://fonts.googleapis.com/css2?family=Roboto:wght@400;700&family=Poppins:wght@500;700&display=swap",
        "https://cdn.jsdelivr.net/npm/chart.js",
        "https://www.gstatic.com/firebasejs/10.12.2/firebase-app.js",
        "https://www.gstatic.com/firebasejs/10.12.2/firebase-firestore.js",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      live_hosts: vec!["firestore.googleapis.com".to_string(), "firebase".to_string()],
      data_dir: None,
      sync: SyncConfig::default(),
      notifications: NotificationConfig::default(),
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      endpoint: "/api/sync-data".to_string(),
      tag: "background-sync-data".to_string(),
      periodic_tag: "data-sync".to_string(),
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/icon-72x72.png".to_string(),
      vibrate: vec![100, 50, 100],
      open_title: "Buka Aplikasi".to_string(),
      close_title: "Tutup".to_string(),
      open_url: "/".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-worker/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
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
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("offline-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-worker").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.version.trim().is_empty() {
      return Err(eyre!("Config error: version must not be empty"));
    }
    self.origin_url()?;
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a possibly relative URL against the worker origin.
  pub fn resolve(&self, url: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(url)
      .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))
  }

  /// Get the data directory, defaulting to $XDG_DATA_HOME/offline-worker.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offline-worker"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_dashboard() {
    let config = Config::default();
    assert_eq!(config.version, "water-system-v1.0.0");
    assert_eq!(config.precache.len(), 9);
    assert!(config.precache.contains(&config.offline_url));
    assert_eq!(config.sync.tag, "background-sync-data");
    assert_eq!(config.notifications.vibrate, vec![100, 50, 100]);
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      "version: dash-v2\norigin: https://dash.example.com\nsync:\n  endpoint: /api/push\n",
    )
    .unwrap();

    assert_eq!(config.version, "dash-v2");
    assert_eq!(config.sync.endpoint, "/api/push");
    assert_eq!(config.sync.periodic_tag, "data-sync");
    assert_eq!(config.offline_url, "/offline.html");
  }

  #[test]
  fn test_resolve_relative_and_absolute() {
    let config = Config::from_yaml("origin: https://dash.example.com\n").unwrap();

    assert_eq!(
      config.resolve("/index.html").unwrap().as_str(),
      "https://dash.example.com/index.html"
    );
    assert_eq!(
      config.resolve("https://cdn.jsdelivr.net/npm/chart.js").unwrap().as_str(),
      "https://cdn.jsdelivr.net/npm/chart.js"
    );
  }

  #[test]
  fn test_empty_version_rejected() {
    let config = Config::from_yaml("version: ''\n").unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    let result = Config::load(Some(Path::new("/nonexistent/offline-worker.yaml")));
    assert!(result.is_err());
  }
}
