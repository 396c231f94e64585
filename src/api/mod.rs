//! HTTP surface. A thin layer: every decision is made by the pipeline.

pub mod routes;
pub mod samples;

pub use routes::{AppState, api_routes};
