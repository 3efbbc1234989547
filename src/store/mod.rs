//! Persisted store of named cache generations.
//!
//! A generation is one versioned snapshot of the cache, identified by name
//! (`{product}-v{semver}`). Each generation maps request identities
//! (method + URL) to full response snapshots. Generations are created at
//! install, populated by the interceptor, and deleted in bulk when a newer
//! generation is promoted.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CachedRequest, GenerationStore, ResponseSnapshot, StoredEntry};
