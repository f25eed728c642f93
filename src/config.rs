use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::classify::RouteRules;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub cache: CacheConfig,
  pub routes: RoutesConfig,
  pub sync: SyncConfig,
  pub network: NetworkConfig,
}

/// Cache generation names and the precache manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Name of the current static generation. Bump on release to invalidate
  /// every previously shipped asset at activation.
  pub static_generation: String,
  /// Name of the current dynamic generation.
  pub dynamic_generation: String,
  /// Paths fetched and stored into the static generation during install.
  pub precache: Vec<String>,
  /// Path of the offline fallback page; must be part of the precache
  /// manifest to be available when the network is down.
  pub offline_path: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      static_generation: "static-v1".to_string(),
      dynamic_generation: "dynamic-v1".to_string(),
      precache: vec!["/".to_string(), "/offline.html".to_string()],
      offline_path: "/offline.html".to_string(),
    }
  }
}

/// Classification rules plus the strategy choice for unclassified requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
  #[serde(flatten)]
  pub rules: RouteRules,
  /// Strategy for requests that match no category. Network-first is the
  /// safe default: an unclassified request is more likely dynamic than
  /// static, and a wrong cache-first guess pins stale bodies.
  pub other: FallbackStrategy,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStrategy {
  #[default]
  NetworkFirst,
  CacheFirst,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Endpoint queued payloads are POSTed to.
  pub endpoint: String,
  /// Tag identifying the drain-pending-queue operation.
  pub tag: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      endpoint: "/api/sync".to_string(),
      tag: "background-sync".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// Base URL relative request paths are resolved against.
  pub base_url: String,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8000".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./burrow.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/burrow/config.yaml
  ///
  /// Falls back to the built-in defaults when no file exists.
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
      None => {
        debug!("no config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("burrow.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("burrow").join("config.yaml");
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
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_consistent() {
    let config = Config::default();
    assert_eq!(config.cache.static_generation, "static-v1");
    assert_eq!(config.cache.dynamic_generation, "dynamic-v1");
    assert!(config.cache.precache.contains(&config.cache.offline_path));
    assert_eq!(config.routes.other, FallbackStrategy::NetworkFirst);
    assert_eq!(config.sync.tag, "background-sync");
  }

  #[test]
  fn partial_yaml_overrides_defaults() {
    let yaml = r#"
cache:
  static_generation: static-v3
  precache:
    - /
    - /offline.html
    - /static/css/app.css
routes:
  api_prefixes:
    - /v2/
  other: cache-first
sync:
  endpoint: /v2/sync
"#;

    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.cache.static_generation, "static-v3");
    // Untouched sections keep their defaults
    assert_eq!(config.cache.dynamic_generation, "dynamic-v1");
    assert_eq!(config.cache.offline_path, "/offline.html");
    assert_eq!(config.routes.rules.api_prefixes, vec!["/v2/"]);
    assert_eq!(config.routes.other, FallbackStrategy::CacheFirst);
    assert_eq!(config.sync.endpoint, "/v2/sync");
    assert_eq!(config.sync.tag, "background-sync");
    assert_eq!(config.network.base_url, "http://localhost:8000");
  }

  #[test]
  fn route_rules_flatten_under_routes() {
    let yaml = r#"
routes:
  static_prefixes:
    - /assets/
"#;

    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.routes.rules.static_prefixes, vec!["/assets/"]);
    // Sibling rule lists keep their defaults
    assert!(config.routes.rules.api_prefixes.contains(&"/api/".to_string()));
  }
}
