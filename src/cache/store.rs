//! Storage trait for cache generations.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::Response;

/// A response captured under a request key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
  /// Request key (absolute URL without fragment)
  pub key: String,
  pub response: Response,
  /// When the entry was written
  pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
  pub fn new(key: impl Into<String>, response: Response) -> Self {
    Self {
      key: key.into(),
      response,
      stored_at: Utc::now(),
    }
  }
}

/// Backend holding the set of named generations.
///
/// Every operation is atomic on its own; callers never hold anything across
/// two calls, so concurrent handlers may interleave freely.
pub trait CacheStore: Send + Sync {
  /// Create the generation if it does not exist. Returns true if it was created.
  fn open(&self, name: &str) -> Result<bool>;

  /// Names of all generations, oldest first.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a generation and everything in it. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Store an entry, creating the generation if needed. Replaces any entry
  /// with the same key.
  fn put(&self, name: &str, entry: StoredResponse) -> Result<()>;

  /// Look up a key in one generation.
  fn match_in(&self, name: &str, key: &str) -> Result<Option<StoredResponse>>;

  /// Keys stored in a generation, sorted. Empty if the generation is absent.
  fn entries(&self, name: &str) -> Result<Vec<String>>;

  /// Look up a key across all generations, oldest generation first.
  fn match_any(&self, key: &str) -> Result<Option<StoredResponse>> {
    for name in self.keys()? {
      if let Some(hit) = self.match_in(&name, key)? {
        return Ok(Some(hit));
      }
    }
    Ok(None)
  }
}
