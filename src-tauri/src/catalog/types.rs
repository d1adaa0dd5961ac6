use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
   pub name: String,
   pub avatar: String,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub link: Option<String>,
}

/// One installable tool as published in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
   pub id: String,
   #[serde(default)]
   pub name: String,
   #[serde(default)]
   pub description: String,
   #[serde(default)]
   pub icon: String,
   #[serde(default)]
   pub author: Author,
   #[serde(default)]
   pub documentation: String,
   pub version: String,
   #[serde(default)]
   pub download_url: String,
}

impl ToolDescriptor {
   /// Display name, falling back to the identity for entries published without one.
   pub fn display_name(&self) -> &str {
      if self.name.is_empty() { &self.id } else { &self.name }
   }

   pub fn has_download(&self) -> bool {
      !self.download_url.is_empty()
   }

   fn validate(&self, index: usize) -> Result<(), CatalogError> {
      let invalid = |reason: String| CatalogError::Invalid { index, reason };

      for (field, value) in [("id", &self.id), ("version", &self.version)] {
         if value.trim().is_empty() {
            return Err(invalid(format!("'{}' must not be empty", field)));
         }
      }

      if self.id.contains(['/', '\\']) || self.id.contains("..") {
         return Err(invalid(format!("id '{}' is not a valid tool identity", self.id)));
      }

      if !self.download_url.is_empty() {
         url::Url::parse(&self.download_url)
            .map_err(|e| invalid(format!("downloadUrl '{}': {}", self.download_url, e)))?;
      }

      Ok(())
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSource {
   Remote,
   Cache,
   Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSnapshot {
   pub source: CatalogSource,
   pub tools: Vec<ToolDescriptor>,
}

#[derive(Deserialize)]
struct RawEntries {
   tools: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct Document<'a> {
   tools: &'a [ToolDescriptor],
}

impl CatalogSnapshot {
   pub fn empty() -> Self {
      Self { source: CatalogSource::Empty, tools: Vec::new() }
   }

   /// Parse and validate a catalog document.
   ///
   /// Entries are decoded one at a time so a malformed entry is reported with its
   /// position rather than as a generic JSON error.
   pub fn parse(bytes: &[u8], source: CatalogSource) -> Result<Self, CatalogError> {
      let raw: RawEntries = serde_json::from_slice(bytes)?;
      let mut seen = HashSet::with_capacity(raw.tools.len());
      let mut tools = Vec::with_capacity(raw.tools.len());

      for (index, value) in raw.tools.into_iter().enumerate() {
         let tool: ToolDescriptor = serde_json::from_value(value)
            .map_err(|e| CatalogError::Invalid { index, reason: e.to_string() })?;
         tool.validate(index)?;
         if !seen.insert(tool.id.clone()) {
            return Err(CatalogError::DuplicateId(tool.id));
         }
         tools.push(tool);
      }

      Ok(Self { source, tools })
   }

   /// Normalized document form, suitable for writing to the cache.
   pub fn to_document(&self) -> Result<Vec<u8>, serde_json::Error> {
      serde_json::to_vec_pretty(&Document { tools: &self.tools })
   }

   pub fn find(&self, tool_id: &str) -> Option<&ToolDescriptor> {
      self.tools.iter().find(|tool| tool.id == tool_id)
   }

   /// Case-insensitive match on name or description, in catalog order.
   pub fn search(&self, term: &str) -> Vec<&ToolDescriptor> {
      let term = term.trim().to_lowercase();
      self
         .tools
         .iter()
         .filter(|tool| {
            term.is_empty()
               || tool.name.to_lowercase().contains(&term)
               || tool.description.to_lowercase().contains(&term)
         })
         .collect()
   }

   pub fn len(&self) -> usize {
      self.tools.len()
   }

   pub fn is_empty(&self) -> bool {
      self.tools.is_empty()
   }
}
