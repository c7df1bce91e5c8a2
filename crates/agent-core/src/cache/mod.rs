//! Cache generation storage.
//!
//! A generation is a named, independently lifetimed set of request/response
//! pairs. Stores hold every generation of the agent's origin keyed by name:
//! - [`MemoryCacheStore`] for tests and ephemeral hosts
//! - [`SqliteCacheStore`] for generations that survive restarts

mod memory;
mod sqlite;
mod traits;

pub use memory::{MemoryCacheStore, MemoryGeneration};
pub use sqlite::{SqliteCacheStore, SqliteGeneration};
pub use traits::{
    check_storable, is_matchable, CacheKey, CacheStore, DynCacheStore, DynGeneration, Generation,
    GenerationStats, StoredEntry,
};
