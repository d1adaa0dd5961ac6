pub mod engine;
pub mod reducer;
pub mod tracker;
pub mod types;

pub use engine::{DownloadEngine, HttpDownloadEngine};
pub use reducer::{Outcome, SessionMap, apply_event};
pub use tracker::DownloadTracker;
pub use types::{
   CleanupPolicy, DownloadEvent, DownloadOutcome, DownloadRequest, DownloadSession, DownloadStatus,
   EngineEvent, Registration, SessionChange, SessionView,
};
