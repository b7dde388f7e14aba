//! Memory-based storage implementations for duet.
//!
//! - [`MemoryLocalCache`]: a non-persistent [`LocalCache`](duet_storage_traits::LocalCache),
//!   cleared when the process exits.
//! - [`MemoryRemoteStore`]: an in-process stand-in for the hosted realtime
//!   database. Inserts are echoed to live subscribers, and every operation can
//!   be slowed down or made to fail so that sync behavior can be exercised
//!   without a network.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use duet_memory_storage::{MemoryLocalCache, MemoryRemoteStore};
//! use duet_storage_traits::RemoteError;
//!
//! let cache = Arc::new(MemoryLocalCache::default());
//! let remote = Arc::new(MemoryRemoteStore::default());
//! remote.fail_inserts_with(Some(RemoteError::PermissionDenied("rls".into())));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

mod cache;
mod remote;

pub use self::cache::MemoryLocalCache;
pub use self::remote::MemoryRemoteStore;
