use std::{future::Future, io, path::PathBuf};

/// Persistence for the last good catalog document. No retries; errors go to the caller.
pub trait CacheStore: Send + Sync {
   fn save(&self, blob: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
   fn load(&self) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

pub struct FileCacheStore {
   path: PathBuf,
}

impl FileCacheStore {
   pub fn new(path: impl Into<PathBuf>) -> Self {
      Self { path: path.into() }
   }

   pub fn path(&self) -> &PathBuf {
      &self.path
   }
}

impl CacheStore for FileCacheStore {
   async fn save(&self, blob: &[u8]) -> io::Result<()> {
      if let Some(parent) = self.path.parent() {
         tokio::fs::create_dir_all(parent).await?;
      }
      // Sibling temp file, renamed over the target.
      let tmp = self.path.with_extension("json.tmp");
      tokio::fs::write(&tmp, blob).await?;
      tokio::fs::rename(&tmp, &self.path).await
   }

   async fn load(&self) -> io::Result<Vec<u8>> {
      tokio::fs::read(&self.path).await
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn save_creates_parent_and_load_reads_back() {
      let dir = tempfile::tempdir().unwrap();
      let store = FileCacheStore::new(dir.path().join("nested").join("tools.json"));

      store.save(b"{\"tools\":[]}").await.unwrap();

      assert_eq!(store.load().await.unwrap(), b"{\"tools\":[]}");
      assert!(!store.path().with_extension("json.tmp").exists());
   }

   #[tokio::test]
   async fn load_missing_file_is_not_found() {
      let dir = tempfile::tempdir().unwrap();
      let store = FileCacheStore::new(dir.path().join("tools.json"));

      let err = store.load().await.unwrap_err();
      assert_eq!(err.kind(), io::ErrorKind::NotFound);
   }
}
