//! Derives what the download button shows for the selected tool.

use crate::{
   catalog::ToolDescriptor,
   downloads::{DownloadStatus, SessionChange, SessionView},
   install::InstallState,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ButtonAction {
   Download,
   Update,
   Installed,
   Starting,
   InProgress { percent: u8 },
   Succeeded,
   Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonState {
   pub action: ButtonAction,
   pub label: String,
   pub enabled: bool,
   /// The "open folder" button follows install state only.
   pub open_enabled: bool,
}

/// A tracked session always wins over the version comparison.
pub fn project(
   tool: &ToolDescriptor,
   install: &InstallState,
   session: Option<&SessionView>,
) -> ButtonState {
   let action = match session {
      Some(session) => match session.status {
         DownloadStatus::Pending => ButtonAction::Starting,
         DownloadStatus::InProgress { percent } => ButtonAction::InProgress { percent },
         DownloadStatus::Succeeded { .. } => ButtonAction::Succeeded,
         DownloadStatus::Failed => ButtonAction::Failed,
      },
      None if !install.installed => ButtonAction::Download,
      None if install.is_outdated(&tool.version) => ButtonAction::Update,
      None => ButtonAction::Installed,
   };
   let is_update = session.is_some_and(|session| session.is_update);

   ButtonState {
      action,
      label: label(action, is_update),
      enabled: matches!(action, ButtonAction::Download | ButtonAction::Update),
      open_enabled: install.installed,
   }
}

fn label(action: ButtonAction, is_update: bool) -> String {
   let verb = if is_update { "Update" } else { "Download" };
   match action {
      ButtonAction::Download => "Download".to_string(),
      ButtonAction::Update => "Update".to_string(),
      ButtonAction::Installed => "Installed".to_string(),
      ButtonAction::Starting => {
         if is_update { "Updating...".to_string() } else { "Downloading...".to_string() }
      }
      ButtonAction::InProgress { percent } => {
         let verb = if is_update { "Updating" } else { "Downloading" };
         format!("{} {}%", verb, percent)
      }
      ButtonAction::Succeeded => format!("{} complete", verb),
      ButtonAction::Failed => format!("{} failed", verb),
   }
}

/// Which tool the UI currently shows. Session changes for other tools are still tracked;
/// this only answers whether a change needs a re-render.
#[derive(Debug, Clone, Default)]
pub struct Selection {
   selected: Option<String>,
}

impl Selection {
   pub fn select(&mut self, tool_id: impl Into<String>) {
      self.selected = Some(tool_id.into());
   }

   pub fn selected(&self) -> Option<&str> {
      self.selected.as_deref()
   }

   pub fn affects(&self, change: &SessionChange) -> bool {
      self.selected.as_deref() == Some(change.tool_id.as_str())
   }
}
