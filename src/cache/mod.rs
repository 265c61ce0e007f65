//! Named cache generations for the offline worker.
//!
//! A generation is one named key → response map (the worker keeps a static
//! and a dynamic one per version). Backends implement [`CacheStore`]:
//! - [`MemoryStore`] keeps everything in process, for tests and throwaway runs
//! - [`SqliteStore`] persists generations across runs

mod generation;
mod memory;
mod sqlite;
mod store;

pub use generation::GenerationNames;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{CacheStore, StoredResponse};
