//! Pure session state machine. No I/O, no clocks: callers pass `now`.

use super::types::{DownloadEvent, DownloadSession, DownloadStatus};
use std::collections::HashMap;
use tokio::time::Instant;

pub type SessionMap = HashMap<String, DownloadSession>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
   Registered,
   /// A session already exists for the tool; nothing changed.
   Duplicate,
   Progressed,
   /// Activity refreshed with nothing visible to re-project.
   Touched,
   /// The session reached a terminal status.
   Finished { session_id: u64, status: DownloadStatus },
   Removed,
   /// Addressed to no session, to a terminal session, or to an older session id.
   Stale,
}

impl Outcome {
   /// Whether the map changed and consumers should re-project.
   pub fn changed(&self) -> bool {
      !matches!(self, Self::Duplicate | Self::Touched | Self::Stale)
   }
}

pub fn apply_event(
   mut sessions: SessionMap,
   event: &DownloadEvent,
   now: Instant,
) -> (SessionMap, Outcome) {
   let outcome = match event {
      DownloadEvent::Begin { tool_id, session_id, is_update } => {
         if sessions.contains_key(tool_id) {
            Outcome::Duplicate
         } else {
            sessions.insert(
               tool_id.clone(),
               DownloadSession {
                  session_id: *session_id,
                  status: DownloadStatus::Pending,
                  is_update: *is_update,
                  last_activity: now,
               },
            );
            Outcome::Registered
         }
      }
      DownloadEvent::Progress { tool_id, session_id, percent } => {
         match active(&mut sessions, tool_id, *session_id) {
            Some(session) => {
               // Last write wins; out-of-order progress may move the percent backwards.
               session.status = DownloadStatus::InProgress { percent: (*percent).min(100) };
               session.last_activity = now;
               Outcome::Progressed
            }
            None => Outcome::Stale,
         }
      }
      DownloadEvent::Activity { tool_id, session_id } => {
         match active(&mut sessions, tool_id, *session_id) {
            Some(session) => {
               session.last_activity = now;
               Outcome::Touched
            }
            None => Outcome::Stale,
         }
      }
      DownloadEvent::Complete { tool_id, session_id, success, is_executable } => {
         match active(&mut sessions, tool_id, *session_id) {
            Some(session) => {
               session.status = if *success {
                  DownloadStatus::Succeeded { is_executable: *is_executable }
               } else {
                  DownloadStatus::Failed
               };
               session.last_activity = now;
               Outcome::Finished { session_id: *session_id, status: session.status }
            }
            None => Outcome::Stale,
         }
      }
      DownloadEvent::Expire { tool_id, session_id } => {
         match active(&mut sessions, tool_id, *session_id) {
            Some(session) => {
               session.status = DownloadStatus::Failed;
               session.last_activity = now;
               Outcome::Finished { session_id: *session_id, status: DownloadStatus::Failed }
            }
            None => Outcome::Stale,
         }
      }
      DownloadEvent::Clear { tool_id, session_id } => match sessions.get(tool_id) {
         Some(session) if session.session_id == *session_id && session.status.is_terminal() => {
            sessions.remove(tool_id);
            Outcome::Removed
         }
         _ => Outcome::Stale,
      },
   };
   (sessions, outcome)
}

/// The non-terminal session for `tool_id`, if it is the one `session_id` names.
fn active<'a>(
   sessions: &'a mut SessionMap,
   tool_id: &str,
   session_id: u64,
) -> Option<&'a mut DownloadSession> {
   sessions
      .get_mut(tool_id)
      .filter(|session| session.session_id == session_id && !session.status.is_terminal())
}
