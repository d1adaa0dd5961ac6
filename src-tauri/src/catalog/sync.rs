use super::{
   cache::CacheStore,
   types::{CatalogSnapshot, CatalogSource},
};
use crate::error::CatalogError;
use std::{future::Future, time::Duration};

/// Where the published catalog document comes from.
pub trait RemoteCatalog: Send + Sync {
   fn fetch_catalog(&self) -> impl Future<Output = Result<Vec<u8>, CatalogError>> + Send;
}

pub struct HttpCatalog {
   client: reqwest::Client,
   url: String,
}

impl HttpCatalog {
   pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
      let client = reqwest::Client::builder().timeout(timeout).build()?;
      Ok(Self { client, url: url.into() })
   }
}

impl RemoteCatalog for HttpCatalog {
   async fn fetch_catalog(&self) -> Result<Vec<u8>, CatalogError> {
      log::debug!("Fetching catalog from {}", self.url);
      let response = self.client.get(&self.url).send().await?;
      if !response.status().is_success() {
         return Err(CatalogError::Status(response.status().as_u16()));
      }
      Ok(response.bytes().await?.to_vec())
   }
}

pub struct CatalogSynchronizer<R, C> {
   remote: R,
   cache: C,
}

impl<R: RemoteCatalog, C: CacheStore> CatalogSynchronizer<R, C> {
   pub fn new(remote: R, cache: C) -> Self {
      Self { remote, cache }
   }

   /// Resolve the catalog: remote, then cache, then empty. Each level is tried once and
   /// this never fails. Only the remote path writes to the cache.
   pub async fn sync(&self) -> CatalogSnapshot {
      match self.fetch_remote().await {
         Ok(snapshot) => {
            self.persist(&snapshot).await;
            log::info!("Synced {} tools from remote catalog", snapshot.len());
            return snapshot;
         }
         Err(e) => log::warn!("Remote catalog unavailable, trying cache: {}", e),
      }

      match self.load_cached().await {
         Ok(snapshot) => {
            log::info!("Loaded {} tools from catalog cache", snapshot.len());
            snapshot
         }
         Err(e) => {
            log::warn!("Catalog cache unavailable, using empty catalog: {:#}", e);
            CatalogSnapshot::empty()
         }
      }
   }

   async fn fetch_remote(&self) -> Result<CatalogSnapshot, CatalogError> {
      let bytes = self.remote.fetch_catalog().await?;
      CatalogSnapshot::parse(&bytes, CatalogSource::Remote)
   }

   async fn load_cached(&self) -> anyhow::Result<CatalogSnapshot> {
      let bytes = self.cache.load().await?;
      Ok(CatalogSnapshot::parse(&bytes, CatalogSource::Cache)?)
   }

   async fn persist(&self, snapshot: &CatalogSnapshot) {
      let blob = match snapshot.to_document() {
         Ok(blob) => blob,
         Err(e) => {
            log::error!("Failed to serialize catalog for cache: {}", e);
            return;
         }
      };
      if let Err(e) = self.cache.save(&blob).await {
         log::warn!("Failed to write catalog cache: {}", e);
      }
   }
}
