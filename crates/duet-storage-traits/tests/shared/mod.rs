//! Shared test functions for [`duet_storage_traits::LocalCache`] backends

#![allow(dead_code)]

pub mod cache_tests;
