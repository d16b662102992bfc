pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod schema;

// Engine and source ports with their local implementations
pub mod ingestion;
pub mod warehouse;

// Pipeline stages
pub mod dimensions;
pub mod orchestrator;
pub mod resolution;
pub mod staging;
