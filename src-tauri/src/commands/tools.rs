use tauri::{AppHandle, State, command};
use tauri_plugin_opener::OpenerExt;
use tool_hub_lib::{
   ButtonState, CatalogSnapshot, DesktopHub, InstallState, SessionView, ToolDescriptor,
};

#[command]
pub async fn tools_sync(hub: State<'_, DesktopHub>) -> Result<CatalogSnapshot, String> {
   log::info!("tools_sync called");
   Ok(hub.sync().await.as_ref().clone())
}

#[command]
pub fn tools_catalog(hub: State<'_, DesktopHub>) -> CatalogSnapshot {
   hub.catalog().as_ref().clone()
}

#[command]
pub fn tools_search(hub: State<'_, DesktopHub>, term: String) -> Vec<ToolDescriptor> {
   hub.search(&term)
}

#[command]
pub fn tools_check_version(hub: State<'_, DesktopHub>, tool_id: String) -> InstallState {
   hub.check_version(&tool_id)
}

/// Returns false when a download for the tool is already tracked.
#[command]
pub async fn tools_download(hub: State<'_, DesktopHub>, tool_id: String) -> Result<bool, String> {
   log::info!("tools_download called for {}", tool_id);
   hub.begin_download(&tool_id).map(|registration| registration.is_accepted()).map_err(|e| {
      log::error!("Failed to start download for {}: {}", tool_id, e);
      format!("Failed to start download: {}", e)
   })
}

#[command]
pub fn tools_download_state(hub: State<'_, DesktopHub>, tool_id: String) -> Option<SessionView> {
   hub.download_state(&tool_id)
}

#[command]
pub fn tools_button_state(
   hub: State<'_, DesktopHub>,
   tool_id: String,
) -> Result<ButtonState, String> {
   hub.button_state(&tool_id).ok_or_else(|| format!("Unknown tool {}", tool_id))
}

#[command]
pub fn tools_open_folder(
   app_handle: AppHandle,
   hub: State<'_, DesktopHub>,
   tool_id: String,
) -> Result<(), String> {
   let dir = hub.install_dir(&tool_id).map_err(|e| format!("{:#}", e))?;
   log::info!("Opening install folder {:?}", dir);
   app_handle
      .opener()
      .open_path(dir.to_string_lossy(), None::<&str>)
      .map_err(|e| format!("Failed to open folder: {}", e))
}

#[command]
pub fn tools_open_author(
   app_handle: AppHandle,
   hub: State<'_, DesktopHub>,
   tool_id: String,
) -> Result<(), String> {
   let link = hub.author_link(&tool_id).map_err(|e| format!("{:#}", e))?;
   log::info!("Opening author link {}", link);
   app_handle
      .opener()
      .open_url(link, None::<&str>)
      .map_err(|e| format!("Failed to open link: {}", e))
}
