//! Submits CycloneDX SBOM documents to Sonatype IQ Server and tracks each
//! evaluation to a terminal outcome without exceeding a concurrency budget.

pub mod config;
pub mod error;
pub mod inventory;
pub mod iq;
pub mod scheduler;
pub mod telemetry;
