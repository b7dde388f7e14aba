//! SQLite cache implementation tests using shared test functions

use duet_sqlite_cache::SqliteLocalCache;

mod shared;

/// Macro to generate tests that run against SQLite cache using shared test functions
macro_rules! test_sqlite_cache {
    ($test_name:ident, $test_fn:path) => {
        #[tokio::test]
        async fn $test_name() {
            let storage = SqliteLocalCache::open_in_memory().unwrap();
            $test_fn(storage).await;
        }
    };
}

test_sqlite_cache!(
    test_load_empty_sqlite,
    shared::cache_tests::test_load_empty
);

test_sqlite_cache!(
    test_append_and_load_sqlite,
    shared::cache_tests::test_append_and_load
);

test_sqlite_cache!(
    test_append_is_idempotent_sqlite,
    shared::cache_tests::test_append_is_idempotent
);

test_sqlite_cache!(
    test_conversations_are_partitioned_sqlite,
    shared::cache_tests::test_conversations_are_partitioned
);

test_sqlite_cache!(
    test_load_returns_expired_entries_sqlite,
    shared::cache_tests::test_load_returns_expired_entries
);

test_sqlite_cache!(
    test_prune_boundary_sqlite,
    shared::cache_tests::test_prune_boundary
);

test_sqlite_cache!(
    test_prune_is_scoped_sqlite,
    shared::cache_tests::test_prune_is_scoped
);

test_sqlite_cache!(
    test_append_after_prune_sqlite,
    shared::cache_tests::test_append_after_prune
);
