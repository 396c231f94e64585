//! docroute: rules-based document classification, analysis and action
//! dispatch.

pub mod actions;
pub mod analyzers;
pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
