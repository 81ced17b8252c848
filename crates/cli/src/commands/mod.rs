//! Offline CLI commands that need neither a store nor a server.

pub mod analyze;
pub mod assign;
pub mod sample_size;

pub use analyze::{run_analyze, AnalyzeArgs};
pub use assign::{run_assign, AssignArgs};
pub use sample_size::{run_sample_size, SampleSizeArgs};
