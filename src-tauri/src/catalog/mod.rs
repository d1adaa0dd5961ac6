pub mod cache;
pub mod sync;
pub mod types;

pub use cache::{CacheStore, FileCacheStore};
pub use sync::{CatalogSynchronizer, HttpCatalog, RemoteCatalog};
pub use types::{Author, CatalogSnapshot, CatalogSource, ToolDescriptor};
