use super::{
   reducer::{Outcome, SessionMap, apply_event},
   types::{
      CleanupPolicy, DownloadEvent, DownloadStatus, EngineEvent, Registration, SessionChange,
      SessionView,
   },
};
use crate::install::InstallResolver;
use std::{
   collections::HashMap,
   sync::{
      Arc, Mutex, MutexGuard,
      atomic::{AtomicU64, Ordering},
   },
   time::Duration,
};
use tokio::{
   sync::broadcast,
   task::{AbortHandle, JoinHandle},
   time::Instant,
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

struct TrackerInner {
   sessions: Mutex<SessionMap>,
   /// Running engine tasks by session id.
   transfers: Mutex<HashMap<u64, AbortHandle>>,
   next_session_id: AtomicU64,
   resolver: InstallResolver,
   policy: CleanupPolicy,
   changes: broadcast::Sender<SessionChange>,
}

/// Owns every download session, keyed by tool id.
///
/// Events are applied regardless of which tool the UI is showing. Each event is reduced under
/// the session lock and the lock is never held across an await, so transitions for one tool
/// never interleave. Cleanup timers are spawned on the current Tokio runtime.
#[derive(Clone)]
pub struct DownloadTracker {
   inner: Arc<TrackerInner>,
}

impl DownloadTracker {
   pub fn new(resolver: InstallResolver, policy: CleanupPolicy) -> Self {
      Self::with_sessions(SessionMap::new(), resolver, policy)
   }

   pub fn with_sessions(
      sessions: SessionMap,
      resolver: InstallResolver,
      policy: CleanupPolicy,
   ) -> Self {
      let next_session_id =
         sessions.values().map(|session| session.session_id).max().unwrap_or(0) + 1;
      let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
      Self {
         inner: Arc::new(TrackerInner {
            sessions: Mutex::new(sessions),
            transfers: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(next_session_id),
            resolver,
            policy,
            changes,
         }),
      }
   }

   pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
      self.inner.changes.subscribe()
   }

   pub fn policy(&self) -> CleanupPolicy {
      self.inner.policy
   }

   /// Register a download. At most one session exists per tool; a second call while one is
   /// tracked (including a terminal one awaiting cleanup) is reported as a duplicate.
   pub fn begin_download(&self, tool_id: &str, is_update: bool) -> Registration {
      let session_id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
      let event = DownloadEvent::Begin { tool_id: tool_id.to_string(), session_id, is_update };
      match self.apply(event) {
         Outcome::Registered => {
            log::info!(
               "Registered {} session {} for {}",
               if is_update { "update" } else { "download" },
               session_id,
               tool_id
            );
            Registration::Accepted { session_id }
         }
         _ => {
            log::info!("Ignoring duplicate download request for {}", tool_id);
            Registration::Duplicate
         }
      }
   }

   pub fn progress(&self, tool_id: &str, session_id: u64, percent: f64) -> Outcome {
      let percent = normalize_percent(percent);
      let event = DownloadEvent::Progress { tool_id: tool_id.to_string(), session_id, percent };
      let outcome = self.apply(event);
      if outcome == Outcome::Stale {
         log::debug!("Dropping stale progress {}% for {} session {}", percent, tool_id, session_id);
      }
      outcome
   }

   /// Record that a transfer is still moving without changing what the UI shows.
   pub fn activity(&self, tool_id: &str, session_id: u64) -> Outcome {
      self.apply(DownloadEvent::Activity { tool_id: tool_id.to_string(), session_id })
   }

   pub fn complete(
      &self,
      tool_id: &str,
      session_id: u64,
      success: bool,
      is_executable: bool,
   ) -> Outcome {
      let outcome = self.apply(DownloadEvent::Complete {
         tool_id: tool_id.to_string(),
         session_id,
         success,
         is_executable,
      });
      match outcome {
         Outcome::Finished { session_id, status } => {
            self.release_transfer(session_id, false);
            self.after_finish(tool_id, session_id, status);
         }
         Outcome::Stale => {
            log::debug!("Dropping stale completion for {} session {}", tool_id, session_id)
         }
         _ => {}
      }
      outcome
   }

   pub fn handle(&self, event: EngineEvent) -> Outcome {
      match event {
         EngineEvent::Progress { tool_id, session_id, percent } => {
            self.progress(&tool_id, session_id, percent)
         }
         EngineEvent::Received { tool_id, session_id, .. } => self.activity(&tool_id, session_id),
         EngineEvent::Complete { tool_id, session_id, success, is_executable } => {
            self.complete(&tool_id, session_id, success, is_executable)
         }
      }
   }

   /// Tie a running engine task to its session so the watchdog can stop it. Ignored when the
   /// session has already finished or been replaced.
   pub fn attach_transfer(&self, tool_id: &str, session_id: u64, handle: AbortHandle) {
      let sessions = self.lock_sessions();
      let active = sessions
         .get(tool_id)
         .is_some_and(|session| session.session_id == session_id && !session.status.is_terminal());
      if active {
         lock(&self.inner.transfers).insert(session_id, handle);
      }
   }

   pub fn download_state(&self, tool_id: &str) -> Option<SessionView> {
      let sessions = self.lock_sessions();
      sessions.get(tool_id).map(|session| SessionView::from_session(tool_id, session))
   }

   pub fn sessions(&self) -> Vec<SessionView> {
      let sessions = self.lock_sessions();
      let mut views: Vec<_> = sessions
         .iter()
         .map(|(tool_id, session)| SessionView::from_session(tool_id, session))
         .collect();
      views.sort_by(|a, b| a.tool_id.cmp(&b.tool_id));
      views
   }

   /// Fail every active session that has seen no event within the stall timeout.
   /// Returns how many sessions were expired.
   pub fn sweep_stalled(&self, now: Instant) -> usize {
      let timeout = self.inner.policy.stall_timeout;
      let stalled: Vec<(String, u64)> = {
         let sessions = self.lock_sessions();
         sessions
            .iter()
            .filter(|(_, session)| {
               !session.status.is_terminal()
                  && now.saturating_duration_since(session.last_activity) >= timeout
            })
            .map(|(tool_id, session)| (tool_id.clone(), session.session_id))
            .collect()
      };

      let mut expired = 0;
      for (tool_id, session_id) in stalled {
         let event = DownloadEvent::Expire { tool_id: tool_id.clone(), session_id };
         if let Outcome::Finished { status, .. } = self.apply(event) {
            log::warn!("Download for {} stalled for {:?}, marking failed", tool_id, timeout);
            self.release_transfer(session_id, true);
            self.after_finish(&tool_id, session_id, status);
            expired += 1;
         }
      }
      expired
   }

   pub fn spawn_watchdog(&self, interval: Duration) -> JoinHandle<()> {
      let tracker = self.clone();
      tokio::spawn(async move {
         let mut ticker = tokio::time::interval(interval);
         loop {
            ticker.tick().await;
            tracker.sweep_stalled(Instant::now());
         }
      })
   }

   fn after_finish(&self, tool_id: &str, session_id: u64, status: DownloadStatus) {
      let policy = self.inner.policy;
      match status {
         DownloadStatus::Succeeded { is_executable } => {
            let install = self.inner.resolver.resolve(tool_id);
            if install.installed {
               log::info!("Download of {} finished and is installed", tool_id);
               let delay = if is_executable { Duration::ZERO } else { policy.success_delay };
               self.schedule_clear(tool_id, session_id, delay);
            } else {
               log::warn!("Download of {} succeeded but install is not confirmed", tool_id);
               self.schedule_clear(tool_id, session_id, policy.success_delay);
            }
         }
         DownloadStatus::Failed => {
            log::warn!("Download of {} failed", tool_id);
            self.schedule_clear(tool_id, session_id, policy.failure_delay);
         }
         _ => {}
      }
   }

   fn release_transfer(&self, session_id: u64, abort: bool) {
      let handle = lock(&self.inner.transfers).remove(&session_id);
      if let Some(handle) = handle.filter(|_| abort) {
         log::info!("Aborting transfer for session {}", session_id);
         handle.abort();
      }
   }

   fn schedule_clear(&self, tool_id: &str, session_id: u64, delay: Duration) {
      let event = DownloadEvent::Clear { tool_id: tool_id.to_string(), session_id };
      if delay.is_zero() {
         self.apply(event);
         return;
      }
      log::debug!("Clearing {} session {} in {:?}", tool_id, session_id, delay);
      let tracker = self.clone();
      tokio::spawn(async move {
         tokio::time::sleep(delay).await;
         tracker.apply(event);
      });
   }

   fn apply(&self, event: DownloadEvent) -> Outcome {
      let (outcome, view) = {
         let mut sessions = self.lock_sessions();
         let (next, outcome) = apply_event(std::mem::take(&mut *sessions), &event, Instant::now());
         *sessions = next;
         let view = sessions
            .get(event.tool_id())
            .map(|session| SessionView::from_session(event.tool_id(), session));
         (outcome, view)
      };

      if outcome == Outcome::Removed {
         log::debug!("Removed download session for {}", event.tool_id());
      }
      if outcome.changed() {
         let change = SessionChange { tool_id: event.tool_id().to_string(), view };
         // Err only means nobody is subscribed.
         let _ = self.inner.changes.send(change);
      }
      outcome
   }

   fn lock_sessions(&self) -> MutexGuard<'_, SessionMap> {
      lock(&self.inner.sessions)
   }
}

/// Both maps are only ever updated in whole steps, so a poisoned lock still guards a
/// consistent value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
   mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Engine percentages arrive as floats; round like the UI shows them and keep within 0..=100.
fn normalize_percent(percent: f64) -> u8 {
   if percent.is_nan() {
      return 0;
   }
   percent.round().clamp(0.0, 100.0) as u8
}
