use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
   fs,
   path::{Path, PathBuf},
   time::Duration,
};

const APP_DIR_NAME: &str = "tool-hub";
const CONFIG_FILE: &str = "config.toml";
const CACHE_FILE: &str = "tools.json";
const TOOLS_DIR: &str = "tools";

const CATALOG_URL_ENV: &str = "TOOL_HUB_CATALOG_URL";
const DATA_DIR_ENV: &str = "TOOL_HUB_DATA_DIR";

pub const DEFAULT_CATALOG_URL: &str = "https://adofaitools.top/data/tools.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
   pub catalog_url: String,
   pub data_dir: Option<PathBuf>,
   pub request_timeout_secs: u64,
   pub failure_display_ms: u64,
   pub success_display_ms: u64,
   pub stall_timeout_secs: u64,
   pub watchdog_interval_secs: u64,
}

impl Default for AppConfig {
   fn default() -> Self {
      Self {
         catalog_url: DEFAULT_CATALOG_URL.to_string(),
         data_dir: None,
         request_timeout_secs: 30,
         failure_display_ms: 2000,
         success_display_ms: 2000,
         stall_timeout_secs: 600,
         watchdog_interval_secs: 30,
      }
   }
}

impl AppConfig {
   /// Load `config.toml` from the user config directory, then apply environment overrides.
   ///
   /// A missing file yields defaults. A file that cannot be read or parsed is logged and
   /// ignored so a bad config never keeps the app from starting.
   pub fn load() -> Self {
      let mut config = match default_config_path() {
         Some(path) if path.exists() => match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
               log::warn!("Ignoring config {:?}: {:#}", path, e);
               Self::default()
            }
         },
         _ => Self::default(),
      };
      config.apply_env();
      config
   }

   pub fn from_file(path: &Path) -> Result<Self> {
      let raw =
         fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
      Self::from_toml(&raw)
   }

   pub fn from_toml(raw: &str) -> Result<Self> {
      toml::from_str(raw).context("Failed to parse config")
   }

   fn apply_env(&mut self) {
      if let Ok(url) = std::env::var(CATALOG_URL_ENV)
         && !url.trim().is_empty()
      {
         self.catalog_url = url;
      }
      if let Ok(dir) = std::env::var(DATA_DIR_ENV)
         && !dir.trim().is_empty()
      {
         self.data_dir = Some(PathBuf::from(dir));
      }
   }

   /// Resolved data directory. Falls back to `<platform data dir>/tool-hub`, then to a
   /// directory under the system temp dir on platforms without one.
   pub fn data_dir(&self) -> PathBuf {
      self.data_dir.clone().unwrap_or_else(|| {
         dirs::data_dir().unwrap_or_else(std::env::temp_dir).join(APP_DIR_NAME)
      })
   }

   pub fn cache_path(&self) -> PathBuf {
      self.data_dir().join(CACHE_FILE)
   }

   pub fn tools_dir(&self) -> PathBuf {
      self.data_dir().join(TOOLS_DIR)
   }

   pub fn request_timeout(&self) -> Duration {
      Duration::from_secs(self.request_timeout_secs)
   }

   pub fn watchdog_interval(&self) -> Duration {
      Duration::from_secs(self.watchdog_interval_secs.max(1))
   }

   pub fn cleanup_policy(&self) -> crate::downloads::CleanupPolicy {
      crate::downloads::CleanupPolicy {
         failure_delay: Duration::from_millis(self.failure_display_ms),
         success_delay: Duration::from_millis(self.success_display_ms),
         stall_timeout: Duration::from_secs(self.stall_timeout_secs),
      }
   }
}

fn default_config_path() -> Option<PathBuf> {
   dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn partial_file_keeps_defaults_for_missing_keys() {
      let config = AppConfig::from_toml(
         r#"
            catalog_url = "http://localhost:8080/tools.json"
            failure_display_ms = 500
         "#,
      )
      .unwrap();

      assert_eq!(config.catalog_url, "http://localhost:8080/tools.json");
      assert_eq!(config.failure_display_ms, 500);
      assert_eq!(config.success_display_ms, 2000);
      assert_eq!(config.stall_timeout_secs, 600);
   }

   #[test]
   fn derived_paths_live_under_data_dir() {
      let config = AppConfig {
         data_dir: Some(PathBuf::from("/tmp/hub")),
         ..Default::default()
      };

      assert_eq!(config.cache_path(), PathBuf::from("/tmp/hub/tools.json"));
      assert_eq!(config.tools_dir(), PathBuf::from("/tmp/hub/tools"));
   }

   #[test]
   fn invalid_toml_is_an_error() {
      assert!(AppConfig::from_toml("catalog_url = [").is_err());
   }

   #[test]
   fn cleanup_policy_uses_configured_delays() {
      let config = AppConfig {
         failure_display_ms: 1500,
         success_display_ms: 250,
         stall_timeout_secs: 42,
         ..Default::default()
      };
      let policy = config.cleanup_policy();

      assert_eq!(policy.failure_delay, Duration::from_millis(1500));
      assert_eq!(policy.success_delay, Duration::from_millis(250));
      assert_eq!(policy.stall_timeout, Duration::from_secs(42));
   }
}
