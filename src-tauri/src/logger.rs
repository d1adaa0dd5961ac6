use log::LevelFilter;

/// Log plugin for the desktop app: stdout, the app log directory, and the webview console.
#[cfg(feature = "desktop")]
pub fn init<R: tauri::Runtime>(level: LevelFilter) -> tauri::plugin::TauriPlugin<R> {
   use tauri_plugin_log::{Target, TargetKind};

   tauri_plugin_log::Builder::new()
      .clear_targets()
      .target(Target::new(TargetKind::Stdout))
      .target(Target::new(TargetKind::LogDir { file_name: None }))
      .target(Target::new(TargetKind::Webview))
      .level(level)
      .build()
}

/// Stderr logging for headless use and tests. `RUST_LOG` overrides `level`.
/// Returns false if a logger was already installed.
pub fn init_stderr(level: LevelFilter) -> bool {
   env_logger::Builder::new()
      .filter_level(level)
      .parse_default_env()
      .format_timestamp_millis()
      .is_test(cfg!(test))
      .try_init()
      .is_ok()
}
