// Prevents additional console window on Windows in release
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use commands::*;
use tauri::{Emitter, Manager};
use tokio::sync::broadcast::error::RecvError;
use tool_hub_lib::{AppConfig, DesktopHub, logger};

mod commands;

const SESSION_CHANGED_EVENT: &str = "tools://session-changed";

fn main() {
   tauri::Builder::default()
      .plugin(logger::init(log::LevelFilter::Info))
      .plugin(tauri_plugin_opener::init())
      .setup(|app| {
         log::info!("Starting app!");

         let mut config = AppConfig::load();
         if config.data_dir.is_none() {
            config.data_dir = Some(app.path().app_data_dir()?);
         }
         log::info!("Using data directory {:?}", config.data_dir());

         let (hub, engine_events) = DesktopHub::from_config(&config)?;
         let mut changes = hub.subscribe();
         app.manage(hub);

         // Background tasks need the runtime context, so start them from inside it
         let app_handle = app.handle().clone();
         let watchdog_interval = config.watchdog_interval();
         tauri::async_runtime::spawn(async move {
            let hub = app_handle.state::<DesktopHub>();
            hub.spawn_event_pump(engine_events);
            hub.spawn_watchdog(watchdog_interval);

            loop {
               match changes.recv().await {
                  Ok(change) => {
                     if let Err(e) = app_handle.emit(SESSION_CHANGED_EVENT, &change) {
                        log::error!("Failed to emit session change: {}", e);
                     }
                  }
                  Err(RecvError::Lagged(skipped)) => {
                     log::warn!("Session change forwarding lagged, skipped {}", skipped);
                  }
                  Err(RecvError::Closed) => break,
               }
            }
         });

         Ok(())
      })
      .invoke_handler(tauri::generate_handler![
         tools_sync,
         tools_catalog,
         tools_search,
         tools_check_version,
         tools_download,
         tools_download_state,
         tools_button_state,
         tools_open_folder,
         tools_open_author,
      ])
      .run(tauri::generate_context!())
      .expect("error while running tauri application");
}
