//! HTTP operator API and process wiring of the archivist service.

pub mod api;
pub mod metrics;
pub mod state;
