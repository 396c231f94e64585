//! Session-trace persistence: an append-only, session-keyed log of
//! classifications, extractions and dispatch attempts.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlTraceStore;
pub use memory::MemoryTraceStore;
pub use traits::{
    AttemptRecord, ClassificationRecord, ExtractionRecord, SessionTrace, TraceStore,
};
