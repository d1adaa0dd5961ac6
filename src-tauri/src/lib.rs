pub mod catalog;
pub mod config;
pub mod downloads;
pub mod error;
pub mod hub;
pub mod install;
pub mod logger;
pub mod projection;

pub use catalog::{CatalogSnapshot, CatalogSource, ToolDescriptor};
pub use config::AppConfig;
pub use downloads::{DownloadStatus, DownloadTracker, Registration, SessionView};
pub use error::{CatalogError, DownloadError};
pub use hub::{DesktopHub, ToolHub};
pub use install::{InstallResolver, InstallState};
pub use projection::{ButtonAction, ButtonState, Selection};
