use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DownloadStatus {
   Pending,
   #[serde(rename_all = "camelCase")]
   InProgress { percent: u8 },
   #[serde(rename_all = "camelCase")]
   Succeeded { is_executable: bool },
   Failed,
}

impl DownloadStatus {
   pub fn is_terminal(&self) -> bool {
      matches!(self, Self::Succeeded { .. } | Self::Failed)
   }
}

/// Tracked state of one tool's download. Owned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
   pub session_id: u64,
   pub status: DownloadStatus,
   /// Captured at registration; selects update vs download wording.
   pub is_update: bool,
   pub last_activity: Instant,
}

/// Read-only projection of a session handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
   pub tool_id: String,
   pub session_id: u64,
   pub status: DownloadStatus,
   pub is_update: bool,
}

impl SessionView {
   pub fn from_session(tool_id: &str, session: &DownloadSession) -> Self {
      Self {
         tool_id: tool_id.to_string(),
         session_id: session.session_id,
         status: session.status,
         is_update: session.is_update,
      }
   }
}

/// Input to the session reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
   Begin { tool_id: String, session_id: u64, is_update: bool },
   Progress { tool_id: String, session_id: u64, percent: u8 },
   /// Bytes arrived without a new percentage to report.
   Activity { tool_id: String, session_id: u64 },
   Complete { tool_id: String, session_id: u64, success: bool, is_executable: bool },
   /// No activity within the stall timeout.
   Expire { tool_id: String, session_id: u64 },
   /// Remove a terminal session once its display delay is over.
   Clear { tool_id: String, session_id: u64 },
}

impl DownloadEvent {
   pub fn tool_id(&self) -> &str {
      match self {
         Self::Begin { tool_id, .. }
         | Self::Progress { tool_id, .. }
         | Self::Activity { tool_id, .. }
         | Self::Complete { tool_id, .. }
         | Self::Expire { tool_id, .. }
         | Self::Clear { tool_id, .. } => tool_id,
      }
   }
}

/// Notification from the download engine, addressed to the session that started the transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
   #[serde(rename_all = "camelCase")]
   Progress { tool_id: String, session_id: u64, percent: f64 },
   /// Keeps the session alive while the total size is unknown or the percentage is unchanged.
   #[serde(rename_all = "camelCase")]
   Received { tool_id: String, session_id: u64, bytes: u64 },
   #[serde(rename_all = "camelCase")]
   Complete { tool_id: String, session_id: u64, success: bool, is_executable: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionChange {
   pub tool_id: String,
   /// `None` once the session has been removed.
   pub view: Option<SessionView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
   Accepted { session_id: u64 },
   Duplicate,
}

impl Registration {
   pub fn is_accepted(&self) -> bool {
      matches!(self, Self::Accepted { .. })
   }

   pub fn session_id(&self) -> Option<u64> {
      match self {
         Self::Accepted { session_id } => Some(*session_id),
         Self::Duplicate => None,
      }
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
   /// How long a failed session stays visible.
   pub failure_delay: Duration,
   /// How long a confirmed, non-executable install keeps its success label.
   pub success_delay: Duration,
   /// Sessions without events for this long are failed by the watchdog.
   pub stall_timeout: Duration,
}

impl Default for CleanupPolicy {
   fn default() -> Self {
      Self {
         failure_delay: Duration::from_secs(2),
         success_delay: Duration::from_secs(2),
         stall_timeout: Duration::from_secs(600),
      }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
   pub tool_id: String,
   pub session_id: u64,
   pub url: String,
   pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
   pub file_name: String,
   pub is_executable: bool,
}
