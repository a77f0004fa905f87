//! Named response caches keyed by request identity.
//!
//! This module provides the storage side of the offline agent:
//! - Request identity (method + URL + `Vary` headers)
//! - A `CacheStorage` trait over any number of named caches
//! - A persistent SQLite backend and an in-memory backend

mod key;
mod memory;
mod storage;
mod traits;

pub use key::RequestKey;
pub use memory::MemoryStorage;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::CachedResponse;
