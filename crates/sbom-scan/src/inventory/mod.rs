//! Turns a directory of SBOM exports into scan jobs.

mod discovery;
mod metadata;
mod plan;

pub use discovery::{discover_documents, DiscoveryError};
pub use metadata::{parse_file_name, parse_path, MalformedNameError, SbomMetadata};
pub use plan::ScanPlan;
