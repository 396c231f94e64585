//! Document pipeline.
//!
//! Every inbound document flows through:
//! 1. `Classifier::classify()`: format and intent, rules only
//! 2. The analyzer for the detected format → `AnalysisResult`
//! 3. `map_analysis()` → `ActionRequest`
//! 4. `Dispatcher::dispatch()` → terminal `ActionResult`, with retry
//!
//! Each step is written to the session trace.

pub mod classifier;
pub mod processor;
pub mod types;

pub use classifier::Classifier;
pub use processor::{Pipeline, SessionReport, SessionStatus};
