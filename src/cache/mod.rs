//! Named cache generations of request → response entries.
//!
//! This module provides the storage side of the worker:
//! - Entries are keyed by normalized method + URL
//! - Generations are created on first write and deleted as a whole
//! - Backends: SQLite (durable) and in-memory

mod memory;
mod storage;
mod traits;

pub use memory::MemoryStore;
pub use storage::SqliteStore;
pub use traits::{CacheStore, CachedResponse, RequestKey};
