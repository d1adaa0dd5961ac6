use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
   fs,
   path::{Path, PathBuf},
   sync::Arc,
};

const INSTALL_RECORD: &str = "install.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallState {
   pub installed: bool,
   pub version: Option<String>,
}

impl InstallState {
   pub fn not_installed() -> Self {
      Self::default()
   }

   /// True when the tool is installed at a version other than `catalog_version`.
   pub fn is_outdated(&self, catalog_version: &str) -> bool {
      self.installed && self.version.as_deref() != Some(catalog_version)
   }
}

/// Source of truth for what is installed locally.
pub trait InstallationState: Send + Sync {
   fn check_version(&self, tool_id: &str) -> Result<InstallState>;
}

/// Forwards install queries without caching, so every call reflects the current disk state.
#[derive(Clone)]
pub struct InstallResolver {
   backend: Arc<dyn InstallationState>,
}

impl InstallResolver {
   pub fn new(backend: Arc<dyn InstallationState>) -> Self {
      Self { backend }
   }

   /// An unreadable install record counts as not installed.
   pub fn resolve(&self, tool_id: &str) -> InstallState {
      match self.backend.check_version(tool_id) {
         Ok(state) => state,
         Err(e) => {
            log::warn!("Failed to check install state for {}: {:#}", tool_id, e);
            InstallState::not_installed()
         }
      }
   }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
   pub version: String,
   pub file: String,
   pub installed_at: String,
}

/// Installs live in `<tools_dir>/<id>/` with an `install.json` record beside the payload.
pub struct FsInstallState {
   tools_dir: PathBuf,
}

impl FsInstallState {
   pub fn new(tools_dir: impl Into<PathBuf>) -> Self {
      Self { tools_dir: tools_dir.into() }
   }

   pub fn tools_dir(&self) -> &Path {
      &self.tools_dir
   }

   pub fn tool_dir(&self, tool_id: &str) -> Result<PathBuf> {
      if tool_id.is_empty() || tool_id.contains(['/', '\\']) || tool_id.contains("..") {
         bail!("Invalid tool id '{}'", tool_id);
      }
      Ok(self.tools_dir.join(tool_id))
   }

   pub fn read_record(&self, tool_id: &str) -> Result<Option<InstallRecord>> {
      let path = self.tool_dir(tool_id)?.join(INSTALL_RECORD);
      if !path.exists() {
         return Ok(None);
      }
      let json =
         fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
      let record = serde_json::from_str(&json)
         .with_context(|| format!("Failed to parse install record {:?}", path))?;
      Ok(Some(record))
   }

   pub fn write_record(&self, tool_id: &str, version: &str, file: &str) -> Result<()> {
      let dir = self.tool_dir(tool_id)?;
      fs::create_dir_all(&dir)?;
      let record = InstallRecord {
         version: version.to_string(),
         file: file.to_string(),
         installed_at: chrono::Utc::now().to_rfc3339(),
      };
      let json = serde_json::to_string_pretty(&record)?;
      fs::write(dir.join(INSTALL_RECORD), json)?;
      log::info!("Recorded install of {} {}", tool_id, version);
      Ok(())
   }
}

impl InstallationState for FsInstallState {
   fn check_version(&self, tool_id: &str) -> Result<InstallState> {
      Ok(match self.read_record(tool_id)? {
         Some(record) => InstallState { installed: true, version: Some(record.version) },
         None => InstallState::not_installed(),
      })
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn missing_record_is_not_installed() {
      let dir = tempfile::tempdir().unwrap();
      let state = FsInstallState::new(dir.path());

      assert_eq!(state.check_version("editor").unwrap(), InstallState::not_installed());
   }

   #[test]
   fn written_record_reports_version() {
      let dir = tempfile::tempdir().unwrap();
      let state = FsInstallState::new(dir.path());

      state.write_record("editor", "2.1", "editor.zip").unwrap();

      let installed = state.check_version("editor").unwrap();
      assert!(installed.installed);
      assert_eq!(installed.version.as_deref(), Some("2.1"));
      let record = state.read_record("editor").unwrap().unwrap();
      assert_eq!(record.file, "editor.zip");
      assert!(chrono::DateTime::parse_from_rfc3339(&record.installed_at).is_ok());
   }

   #[test]
   fn path_like_ids_are_rejected() {
      let dir = tempfile::tempdir().unwrap();
      let state = FsInstallState::new(dir.path());

      assert!(state.tool_dir("../escape").is_err());
      assert!(state.tool_dir("a/b").is_err());
      assert!(state.write_record("", "1", "f").is_err());
   }

   #[test]
   fn resolver_reads_fresh_state_each_call() {
      let dir = tempfile::tempdir().unwrap();
      let backend = Arc::new(FsInstallState::new(dir.path()));
      let resolver = InstallResolver::new(backend.clone());

      assert!(!resolver.resolve("editor").installed);
      backend.write_record("editor", "1.0", "editor.exe").unwrap();
      assert_eq!(resolver.resolve("editor").version.as_deref(), Some("1.0"));
   }

   #[test]
   fn corrupt_record_resolves_to_not_installed() {
      let dir = tempfile::tempdir().unwrap();
      let backend = FsInstallState::new(dir.path());
      fs::create_dir_all(dir.path().join("editor")).unwrap();
      fs::write(dir.path().join("editor").join(INSTALL_RECORD), "{").unwrap();

      assert!(backend.check_version("editor").is_err());
      let resolver = InstallResolver::new(Arc::new(backend));
      assert_eq!(resolver.resolve("editor"), InstallState::not_installed());
   }

   #[test]
   fn outdated_only_when_installed_and_different() {
      let installed = |v: &str| InstallState { installed: true, version: Some(v.to_string()) };

      assert!(installed("1.0").is_outdated("1.1"));
      assert!(!installed("1.1").is_outdated("1.1"));
      assert!(!InstallState::not_installed().is_outdated("1.1"));
   }
}
