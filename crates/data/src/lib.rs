//! PostgreSQL storage for A/B tests.
//!
//! This crate provides:
//! - Database client with embedded migrations
//! - Row models for tests and arms
//! - A [`TestStore`](autoani_core::TestStore) implementation with atomic counters

pub mod database;
pub mod models;
pub mod repositories;

pub use database::DatabaseClient;
pub use models::{AbTestRecord, VariantRecord};
pub use repositories::PgTestStore;
