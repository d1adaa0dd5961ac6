use thiserror::Error;

/// Failures while obtaining or decoding a tool catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
   #[error("failed to fetch catalog: {0}")]
   Network(#[from] reqwest::Error),

   #[error("catalog request returned HTTP {0}")]
   Status(u16),

   #[error("catalog is not valid JSON: {0}")]
   Parse(#[from] serde_json::Error),

   #[error("catalog entry {index} is invalid: {reason}")]
   Invalid { index: usize, reason: String },

   #[error("catalog contains duplicate tool id '{0}'")]
   DuplicateId(String),
}

#[derive(Debug, Error)]
pub enum DownloadError {
   #[error("tool '{0}' is not in the current catalog")]
   UnknownTool(String),

   #[error("tool '{0}' has no download source")]
   NoSource(String),

   #[error("download request failed: {0}")]
   Request(#[from] reqwest::Error),

   #[error("download returned HTTP {0}")]
   Status(u16),

   #[error("failed to write download: {0}")]
   Io(#[from] std::io::Error),
}
