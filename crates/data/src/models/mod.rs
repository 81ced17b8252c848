//! Row models for the A/B test tables.

pub mod ab_test;

pub use ab_test::{AbTestRecord, VariantRecord};
