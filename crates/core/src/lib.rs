//! A/B testing engine for the AUTO ANI dealership site.
//!
//! Deterministic visitor assignment, impression/conversion counting,
//! two-proportion significance analysis and the test lifecycle, with storage
//! behind the [`TestStore`] trait.

pub mod analyzer;
pub mod assignment;
pub mod config;
pub mod config_loader;
pub mod engine;
pub mod error;
pub mod events;
pub mod experiment;
pub mod lifecycle;
pub mod memory_store;
pub mod recorder;
pub mod report;
pub mod stats;
pub mod traits;

pub use analyzer::{analyze, AnalysisResult, VariantStats};
pub use assignment::assign;
pub use config::{AppConfig, DatabaseConfig, ExperimentDefaults, ServerConfig, StorageBackend, SweepConfig};
pub use config_loader::ConfigLoader;
pub use engine::{Assignment, ExperimentEngine};
pub use error::AbTestError;
pub use events::{EventKind, IgnoreReason, RecordOutcome};
pub use experiment::{AbTest, ArmWeight, NewAbTest, NewVariant, TestStatus, TrafficSplit, Variant};
pub use lifecycle::{LifecycleController, StopReason};
pub use memory_store::InMemoryTestStore;
pub use recorder::EventRecorder;
pub use report::ReportFormatter;
pub use traits::TestStore;
