//! Typed access to the A/B test tables.

pub mod ab_test_repo;

pub use ab_test_repo::PgTestStore;
