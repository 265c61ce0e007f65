//! In-process cache backend.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::store::{CacheStore, StoredResponse};

#[derive(Debug, Default)]
struct Generation {
  name: String,
  entries: BTreeMap<String, StoredResponse>,
}

/// Cache storage kept entirely in memory. Generations keep creation order.
#[derive(Debug, Default)]
pub struct MemoryStore {
  generations: RwLock<Vec<Generation>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryStore {
  fn open(&self, name: &str) -> Result<bool> {
    let mut generations = self
      .generations
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if generations.iter().any(|g| g.name == name) {
      return Ok(false);
    }

    generations.push(Generation {
      name: name.to_string(),
      entries: BTreeMap::new(),
    });
    Ok(true)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let generations = self
      .generations
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(generations.iter().map(|g| g.name.clone()).collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut generations = self
      .generations
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let before = generations.len();
    generations.retain(|g| g.name != name);
    Ok(generations.len() != before)
  }

  fn put(&self, name: &str, entry: StoredResponse) -> Result<()> {
    let mut generations = self
      .generations
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    match generations.iter_mut().find(|g| g.name == name) {
      Some(generation) => {
        generation.entries.insert(entry.key.clone(), entry);
      }
      None => {
        let mut entries = BTreeMap::new();
        entries.insert(entry.key.clone(), entry);
        generations.push(Generation {
          name: name.to_string(),
          entries,
        });
      }
    }
    Ok(())
  }

  fn match_in(&self, name: &str, key: &str) -> Result<Option<StoredResponse>> {
    let generations = self
      .generations
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      generations
        .iter()
        .find(|g| g.name == name)
        .and_then(|g| g.entries.get(key))
        .cloned(),
    )
  }

  fn entries(&self, name: &str) -> Result<Vec<String>> {
    let generations = self
      .generations
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      generations
        .iter()
        .find(|g| g.name == name)
        .map(|g| g.entries.keys().cloned().collect())
        .unwrap_or_default(),
    )
  }
}
