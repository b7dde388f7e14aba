//! Memory cache implementation tests using shared test functions

use duet_memory_storage::MemoryLocalCache;

mod shared;

/// Macro to generate tests that run against Memory cache using shared test functions
macro_rules! test_memory_cache {
    ($test_name:ident, $test_fn:path) => {
        #[tokio::test]
        async fn $test_name() {
            let storage = MemoryLocalCache::default();
            $test_fn(storage).await;
        }
    };
}

test_memory_cache!(
    test_load_empty_memory,
    shared::cache_tests::test_load_empty
);

test_memory_cache!(
    test_append_and_load_memory,
    shared::cache_tests::test_append_and_load
);

test_memory_cache!(
    test_append_is_idempotent_memory,
    shared::cache_tests::test_append_is_idempotent
);

test_memory_cache!(
    test_conversations_are_partitioned_memory,
    shared::cache_tests::test_conversations_are_partitioned
);

test_memory_cache!(
    test_load_returns_expired_entries_memory,
    shared::cache_tests::test_load_returns_expired_entries
);

test_memory_cache!(
    test_prune_boundary_memory,
    shared::cache_tests::test_prune_boundary
);

test_memory_cache!(
    test_prune_is_scoped_memory,
    shared::cache_tests::test_prune_is_scoped
);

test_memory_cache!(
    test_append_after_prune_memory,
    shared::cache_tests::test_append_after_prune
);
