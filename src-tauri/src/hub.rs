use crate::{
   catalog::{
      CacheStore, CatalogSnapshot, CatalogSynchronizer, FileCacheStore, HttpCatalog,
      RemoteCatalog, ToolDescriptor,
   },
   config::AppConfig,
   downloads::{
      DownloadEngine, DownloadRequest, DownloadTracker, EngineEvent, HttpDownloadEngine,
      Registration, SessionChange, SessionView,
   },
   error::DownloadError,
   install::{FsInstallState, InstallResolver, InstallState},
   projection::{self, ButtonState},
};
use anyhow::{Context, Result, bail};
use std::{
   path::PathBuf,
   sync::{Arc, RwLock},
};
use tokio::{
   sync::{broadcast, mpsc},
   task::JoinHandle,
};

pub type DesktopHub = ToolHub<HttpCatalog, FileCacheStore, HttpDownloadEngine>;

/// Entry point for the UI: current catalog, install state, and download sessions.
pub struct ToolHub<R, C, E> {
   synchronizer: CatalogSynchronizer<R, C>,
   catalog: RwLock<Arc<CatalogSnapshot>>,
   resolver: InstallResolver,
   tracker: DownloadTracker,
   engine: Arc<E>,
   tools_dir: PathBuf,
}

impl DesktopHub {
   /// Build the HTTP-backed hub. The returned receiver carries engine events and must be
   /// handed to [`ToolHub::spawn_event_pump`].
   pub fn from_config(
      config: &AppConfig,
   ) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
      let tools_dir = config.tools_dir();
      std::fs::create_dir_all(&tools_dir)
         .with_context(|| format!("Failed to create tools directory {:?}", tools_dir))?;

      let remote = HttpCatalog::new(config.catalog_url.clone(), config.request_timeout())
         .context("Failed to build catalog client")?;
      let cache = FileCacheStore::new(config.cache_path());
      let installs = Arc::new(FsInstallState::new(&tools_dir));

      let (events_tx, events_rx) = mpsc::unbounded_channel();
      let engine = HttpDownloadEngine::new(reqwest::Client::new(), installs.clone(), events_tx);
      let resolver = InstallResolver::new(installs);
      let tracker = DownloadTracker::new(resolver.clone(), config.cleanup_policy());

      let hub = ToolHub::new(
         CatalogSynchronizer::new(remote, cache),
         resolver,
         tracker,
         engine,
         tools_dir,
      );
      Ok((hub, events_rx))
   }
}

impl<R, C, E> ToolHub<R, C, E>
where
   R: RemoteCatalog,
   C: CacheStore,
   E: DownloadEngine + 'static,
{
   pub fn new(
      synchronizer: CatalogSynchronizer<R, C>,
      resolver: InstallResolver,
      tracker: DownloadTracker,
      engine: E,
      tools_dir: PathBuf,
   ) -> Self {
      Self {
         synchronizer,
         catalog: RwLock::new(Arc::new(CatalogSnapshot::empty())),
         resolver,
         tracker,
         engine: Arc::new(engine),
         tools_dir,
      }
   }

   /// Fetch the catalog (remote, cache, or empty) and make it current.
   pub async fn sync(&self) -> Arc<CatalogSnapshot> {
      let snapshot = Arc::new(self.synchronizer.sync().await);
      *self.catalog.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot.clone();
      snapshot
   }

   pub fn catalog(&self) -> Arc<CatalogSnapshot> {
      self.catalog.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
   }

   pub fn search(&self, term: &str) -> Vec<ToolDescriptor> {
      self.catalog().search(term).into_iter().cloned().collect()
   }

   pub fn check_version(&self, tool_id: &str) -> InstallState {
      self.resolver.resolve(tool_id)
   }

   pub fn tracker(&self) -> &DownloadTracker {
      &self.tracker
   }

   /// Register a download for a catalog tool and start the engine in the background.
   /// A tool that already has a session yields `Registration::Duplicate` and starts nothing.
   pub fn begin_download(&self, tool_id: &str) -> Result<Registration, DownloadError> {
      let tool = self
         .catalog()
         .find(tool_id)
         .cloned()
         .ok_or_else(|| DownloadError::UnknownTool(tool_id.to_string()))?;
      if !tool.has_download() {
         return Err(DownloadError::NoSource(tool.id));
      }

      let is_update = self.resolver.resolve(tool_id).is_outdated(&tool.version);
      let registration = self.tracker.begin_download(tool_id, is_update);
      let Registration::Accepted { session_id } = registration else {
         return Ok(registration);
      };

      let request = DownloadRequest {
         tool_id: tool.id,
         session_id,
         url: tool.download_url,
         version: tool.version,
      };
      let engine = self.engine.clone();
      let tracker = self.tracker.clone();
      let transfer = tokio::spawn(async move {
         let tool_id = request.tool_id.clone();
         if let Err(e) = engine.start_download(request).await {
            log::error!("Failed to download {}: {}", tool_id, e);
            // The engine normally reports this itself; a second completion is a no-op.
            tracker.complete(&tool_id, session_id, false, false);
         }
      });
      self.tracker.attach_transfer(tool_id, session_id, transfer.abort_handle());

      Ok(registration)
   }

   pub fn download_state(&self, tool_id: &str) -> Option<SessionView> {
      self.tracker.download_state(tool_id)
   }

   /// Button state for a catalog tool, or `None` if the tool is not in the catalog.
   pub fn button_state(&self, tool_id: &str) -> Option<ButtonState> {
      let catalog = self.catalog();
      let tool = catalog.find(tool_id)?;
      let install = self.resolver.resolve(tool_id);
      let session = self.tracker.download_state(tool_id);
      Some(projection::project(tool, &install, session.as_ref()))
   }

   pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
      self.tracker.subscribe()
   }

   /// Directory of an installed tool.
   pub fn install_dir(&self, tool_id: &str) -> Result<PathBuf> {
      if !self.resolver.resolve(tool_id).installed {
         bail!("Tool {} is not installed", tool_id);
      }
      Ok(self.tools_dir.join(tool_id))
   }

   /// Author profile link of a catalog tool.
   pub fn author_link(&self, tool_id: &str) -> Result<String> {
      let catalog = self.catalog();
      let tool = catalog.find(tool_id).with_context(|| format!("Unknown tool {}", tool_id))?;
      match &tool.author.link {
         Some(link) if !link.is_empty() => Ok(link.clone()),
         _ => bail!("Tool {} has no author link", tool_id),
      }
   }

   /// Apply engine events to the tracker until the engine side of the channel closes.
   pub fn spawn_event_pump(
      &self,
      mut events: mpsc::UnboundedReceiver<EngineEvent>,
   ) -> JoinHandle<()> {
      let tracker = self.tracker.clone();
      tokio::spawn(async move {
         while let Some(event) = events.recv().await {
            tracker.handle(event);
         }
         log::debug!("Download event channel closed");
      })
   }

   pub fn spawn_watchdog(&self, interval: std::time::Duration) -> JoinHandle<()> {
      self.tracker.spawn_watchdog(interval)
   }
}
