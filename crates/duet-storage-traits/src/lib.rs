//! Duet storage - message types and the two storage interfaces the chat sync
//! core is written against.
//!
//! - [`LocalCache`]: the on-device, append-only message store used for offline
//!   reading and as a durability fallback for sends.
//! - [`RemoteStore`]: the optional hosted realtime database (history query,
//!   insert, prune, live insert feed).
//!
//! Both are object safe so the core can hold them as `Arc<dyn ...>`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod cache;
pub mod conversation;
pub mod messages;
pub mod remote;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use self::cache::{CacheError, LocalCache};
pub use self::conversation::ConversationId;
pub use self::messages::{Message, RETENTION_HOURS, retention_cutoff};
pub use self::remote::{InsertSubscription, RemoteError, RemoteStore};

/// Backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Memory
    Memory,
    /// SQLite
    SQLite,
}

impl Backend {
    /// Check if it's a persistent backend
    ///
    /// All values different from [`Backend::Memory`] are considered persistent
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_is_not_persistent() {
        assert!(!Backend::Memory.is_persistent());
        assert!(Backend::SQLite.is_persistent());
    }
}
