//! M-Tree integration test module.
//!
//! These tests drive whole trees through the public API and compare every
//! answer against a linear scan over the same objects.

mod delete_test;
mod insert_test;
mod multi_threaded_test;
mod persistence_test;
mod query_test;
mod split_strategy_test;
