use super::types::{DownloadOutcome, DownloadRequest, EngineEvent};
use crate::{error::DownloadError, install::FsInstallState};
use futures_util::StreamExt;
use std::{
   future::Future,
   path::{Path, PathBuf},
   sync::Arc,
   time::Duration,
};
use tokio::{io::AsyncWriteExt, sync::mpsc, time::Instant};

/// Longest gap between engine events while bytes keep arriving.
const ACTIVITY_INTERVAL: Duration = Duration::from_secs(5);

/// Performs the transfer for a registered download and reports it through engine events.
pub trait DownloadEngine: Send + Sync {
   fn start_download(
      &self,
      request: DownloadRequest,
   ) -> impl Future<Output = Result<DownloadOutcome, DownloadError>> + Send;
}

pub struct HttpDownloadEngine {
   client: reqwest::Client,
   installs: Arc<FsInstallState>,
   events: mpsc::UnboundedSender<EngineEvent>,
}

/// Removes the partial file unless the transfer got as far as renaming it. Covers both error
/// returns and the task being aborted mid-stream.
struct PartFile {
   path: PathBuf,
   armed: bool,
}

impl PartFile {
   fn new(path: PathBuf) -> Self {
      Self { path, armed: true }
   }

   async fn persist(mut self, target: &Path) -> std::io::Result<()> {
      tokio::fs::rename(&self.path, target).await?;
      self.armed = false;
      Ok(())
   }
}

impl Drop for PartFile {
   fn drop(&mut self) {
      if !self.armed {
         return;
      }
      match std::fs::remove_file(&self.path) {
         Ok(()) => log::debug!("Removed partial download {:?}", self.path),
         Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
         Err(e) => log::warn!("Failed to remove partial download {:?}: {}", self.path, e),
      }
   }
}

impl HttpDownloadEngine {
   pub fn new(
      client: reqwest::Client,
      installs: Arc<FsInstallState>,
      events: mpsc::UnboundedSender<EngineEvent>,
   ) -> Self {
      Self { client, installs, events }
   }

   fn emit(&self, event: EngineEvent) {
      if self.events.send(event).is_err() {
         log::debug!("Download event dropped, no listener");
      }
   }

   async fn download(&self, request: &DownloadRequest) -> Result<DownloadOutcome, DownloadError> {
      let tool_id = &request.tool_id;
      let session_id = request.session_id;
      log::info!("Downloading {} {} from {}", tool_id, request.version, request.url);

      let tool_dir = self
         .installs
         .tool_dir(tool_id)
         .map_err(|_| DownloadError::UnknownTool(tool_id.clone()))?;
      tokio::fs::create_dir_all(&tool_dir).await?;

      let response = self.client.get(&request.url).send().await?;
      if !response.status().is_success() {
         return Err(DownloadError::Status(response.status().as_u16()));
      }

      let file_name = file_name_for(&request.url, tool_id);
      let total = response.content_length().filter(|len| *len > 0);
      let part = PartFile::new(tool_dir.join(format!("{}.part", file_name)));
      let mut file = tokio::fs::File::create(&part.path).await?;

      let mut stream = response.bytes_stream();
      let mut received: u64 = 0;
      let mut last_percent = None;
      let mut last_event: Option<Instant> = None;
      while let Some(chunk) = stream.next().await {
         let chunk = chunk?;
         file.write_all(&chunk).await?;
         received += chunk.len() as u64;

         let percent =
            total.map(|total| (received as f64 / total as f64 * 100.0).round().min(100.0));
         if let Some(percent) = percent.filter(|percent| last_percent != Some(*percent as u8)) {
            last_percent = Some(percent as u8);
            self.emit(EngineEvent::Progress { tool_id: tool_id.clone(), session_id, percent });
         } else if last_event.is_none_or(|at| at.elapsed() >= ACTIVITY_INTERVAL) {
            self.emit(EngineEvent::Received {
               tool_id: tool_id.clone(),
               session_id,
               bytes: received,
            });
         } else {
            continue;
         }
         last_event = Some(Instant::now());
      }
      file.flush().await?;
      drop(file);

      part.persist(&tool_dir.join(&file_name)).await?;
      log::info!("Downloaded {} bytes for {}", received, tool_id);

      self
         .installs
         .write_record(tool_id, &request.version, &file_name)
         .map_err(|e| DownloadError::Io(std::io::Error::other(format!("{:#}", e))))?;

      Ok(DownloadOutcome { is_executable: is_executable(&file_name), file_name })
   }
}

impl DownloadEngine for HttpDownloadEngine {
   async fn start_download(
      &self,
      request: DownloadRequest,
   ) -> Result<DownloadOutcome, DownloadError> {
      let result = self.download(&request).await;
      let (success, is_executable) = match &result {
         Ok(outcome) => (true, outcome.is_executable),
         Err(e) => {
            log::error!("Download of {} failed: {}", request.tool_id, e);
            (false, false)
         }
      };
      self.emit(EngineEvent::Complete {
         tool_id: request.tool_id.clone(),
         session_id: request.session_id,
         success,
         is_executable,
      });
      result
   }
}

/// Last path segment of the URL, or `<tool_id>.bin` when the URL has none usable.
fn file_name_for(url: &str, tool_id: &str) -> String {
   url::Url::parse(url)
      .ok()
      .and_then(|url| {
         url.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
      })
      .filter(|name| !name.is_empty() && name != "." && name != "..")
      .unwrap_or_else(|| format!("{}.bin", tool_id))
}

fn is_executable(file_name: &str) -> bool {
   Path::new(file_name)
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::install::InstallationState;
   use tokio::{
      io::{AsyncReadExt, AsyncWriteExt},
      net::TcpListener,
   };

   type Events = mpsc::UnboundedReceiver<EngineEvent>;

   /// Accept one connection, write `head` and `body`, then either close or hold it open.
   async fn serve_raw(head: String, body: Vec<u8>, hold_open: bool) -> String {
      let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
      let addr = listener.local_addr().unwrap();
      tokio::spawn(async move {
         let (mut socket, _) = listener.accept().await.unwrap();
         let mut buf = [0u8; 4096];
         let _ = socket.read(&mut buf).await;
         socket.write_all(head.as_bytes()).await.unwrap();
         socket.write_all(&body).await.unwrap();
         if hold_open {
            std::future::pending::<()>().await;
         }
         socket.shutdown().await.unwrap();
      });
      format!("http://{}", addr)
   }

   /// Serve a single canned HTTP response and return the base URL.
   async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
      let head = format!(
         "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
         status,
         body.len()
      );
      serve_raw(head, body, false).await
   }

   fn engine(dir: &Path) -> (HttpDownloadEngine, Arc<FsInstallState>, Events) {
      let installs = Arc::new(FsInstallState::new(dir));
      let (tx, rx) = mpsc::unbounded_channel();
      (HttpDownloadEngine::new(reqwest::Client::new(), installs.clone(), tx), installs, rx)
   }

   fn request(tool_id: &str, url: String, version: &str) -> DownloadRequest {
      DownloadRequest { tool_id: tool_id.into(), session_id: 9, url, version: version.into() }
   }

   fn drain(rx: &mut Events) -> Vec<EngineEvent> {
      let mut events = Vec::new();
      while let Ok(event) = rx.try_recv() {
         events.push(event);
      }
      events
   }

   #[tokio::test]
   async fn successful_download_writes_file_and_install_record() {
      let dir = tempfile::tempdir().unwrap();
      let base = serve_once("200 OK", vec![7u8; 64 * 1024]).await;
      let (engine, installs, mut rx) = engine(dir.path());

      let outcome = engine
         .start_download(request("editor", format!("{}/files/Editor.EXE", base), "2.1"))
         .await
         .unwrap();

      assert_eq!(outcome.file_name, "Editor.EXE");
      assert!(outcome.is_executable);
      let payload = std::fs::read(dir.path().join("editor").join("Editor.EXE")).unwrap();
      assert_eq!(payload.len(), 64 * 1024);
      assert!(!dir.path().join("editor").join("Editor.EXE.part").exists());
      assert_eq!(installs.check_version("editor").unwrap().version.as_deref(), Some("2.1"));

      let events = drain(&mut rx);
      assert!(matches!(
         events.last(),
         Some(EngineEvent::Complete { session_id: 9, success: true, is_executable: true, .. })
      ));
      let percents: Vec<f64> = events
         .iter()
         .filter_map(|event| match event {
            EngineEvent::Progress { percent, session_id: 9, .. } => Some(*percent),
            _ => None,
         })
         .collect();
      assert_eq!(percents.last(), Some(&100.0));
   }

   #[tokio::test]
   async fn unknown_length_reports_received_bytes() {
      let dir = tempfile::tempdir().unwrap();
      let head = "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_string();
      let base = serve_raw(head, vec![1u8; 200 * 1024], false).await;
      let (engine, _, mut rx) = engine(dir.path());

      engine.start_download(request("editor", format!("{}/tool.zip", base), "1")).await.unwrap();

      let events = drain(&mut rx);
      assert!(!events.iter().any(|event| matches!(event, EngineEvent::Progress { .. })));
      assert!(matches!(
         events.first(),
         Some(EngineEvent::Received { session_id: 9, bytes, .. }) if *bytes > 0
      ));
      assert!(matches!(events.last(), Some(EngineEvent::Complete { success: true, .. })));
   }

   #[tokio::test]
   async fn http_error_reports_failed_completion() {
      let dir = tempfile::tempdir().unwrap();
      let base = serve_once("404 Not Found", Vec::new()).await;
      let (engine, installs, mut rx) = engine(dir.path());

      let url = format!("{}/missing.zip", base);
      let result = engine.start_download(request("editor", url, "1")).await;

      assert!(matches!(result, Err(DownloadError::Status(404))));
      assert!(!installs.check_version("editor").unwrap().installed);
      assert_eq!(
         drain(&mut rx),
         vec![EngineEvent::Complete {
            tool_id: "editor".into(),
            session_id: 9,
            success: false,
            is_executable: false
         }]
      );
   }

   #[tokio::test]
   async fn truncated_body_removes_partial_file() {
      let dir = tempfile::tempdir().unwrap();
      let head = "HTTP/1.1 200 OK\r\nContent-Length: 100000\r\nConnection: close\r\n\r\n";
      let base = serve_raw(head.to_string(), vec![3u8; 1000], false).await;
      let (engine, installs, mut rx) = engine(dir.path());

      let url = format!("{}/tool.zip", base);
      let result = engine.start_download(request("editor", url, "1")).await;

      assert!(matches!(result, Err(DownloadError::Request(_))));
      let tool_dir = dir.path().join("editor");
      assert!(!tool_dir.join("tool.zip.part").exists());
      assert!(!tool_dir.join("tool.zip").exists());
      assert!(!installs.check_version("editor").unwrap().installed);
      assert!(matches!(drain(&mut rx).last(), Some(EngineEvent::Complete { success: false, .. })));
   }

   #[tokio::test]
   async fn aborted_transfer_removes_partial_file() {
      let dir = tempfile::tempdir().unwrap();
      let head = "HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\n";
      let base = serve_raw(head.to_string(), vec![3u8; 1000], true).await;
      let (engine, _, mut rx) = engine(dir.path());
      let part_path = dir.path().join("editor").join("tool.zip.part");

      let url = format!("{}/tool.zip", base);
      let transfer =
         tokio::spawn(async move { engine.start_download(request("editor", url, "1")).await });
      let first = rx.recv().await.unwrap();
      assert!(matches!(first, EngineEvent::Progress { session_id: 9, .. }));
      assert!(part_path.exists());

      transfer.abort();
      assert!(transfer.await.unwrap_err().is_cancelled());
      assert!(!part_path.exists());
   }

   #[test]
   fn file_name_comes_from_last_url_segment() {
      assert_eq!(file_name_for("https://x.dev/a/b/tool.zip?v=2", "t"), "tool.zip");
      assert_eq!(file_name_for("https://x.dev/", "t"), "t.bin");
      assert_eq!(file_name_for("not a url", "t"), "t.bin");
   }

   #[test]
   fn only_exe_files_are_executable() {
      assert!(is_executable("Setup.exe"));
      assert!(is_executable("SETUP.EXE"));
      assert!(!is_executable("tool.zip"));
      assert!(!is_executable("exe"));
   }
}
