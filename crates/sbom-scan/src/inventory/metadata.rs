use std::path::Path;

use serde::Serialize;

const DOCUMENT_EXTENSION: &str = ".xml";

/// Fields encoded in an SBOM file name:
/// `[application_name]_[stage]_[application_internal_id].xml`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SbomMetadata {
    pub application_name: String,
    pub stage: String,
    pub application_internal_id: String,
}

impl SbomMetadata {
    pub fn label(&self) -> String {
        format!(
            "{} ({}, {})",
            self.application_name, self.stage, self.application_internal_id
        )
    }
}

/// Raised when a file name does not follow the naming convention.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "invalid file name '{file_name}': expected '[application_name]_[stage]_[applicationInternalId].xml'"
)]
pub struct MalformedNameError {
    pub file_name: String,
}

/// Splits from the right so application names may contain underscores.
pub fn parse_file_name(file_name: &str) -> Result<SbomMetadata, MalformedNameError> {
    let malformed = || MalformedNameError {
        file_name: file_name.to_string(),
    };

    let stem = file_name
        .strip_suffix(DOCUMENT_EXTENSION)
        .unwrap_or(file_name);
    let mut parts = stem.rsplitn(3, '_');

    let (Some(application_internal_id), Some(stage), Some(application_name)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    if application_name.is_empty() || stage.is_empty() || application_internal_id.is_empty() {
        return Err(malformed());
    }

    Ok(SbomMetadata {
        application_name: application_name.to_string(),
        stage: stage.to_string(),
        application_internal_id: application_internal_id.to_string(),
    })
}

pub fn parse_path(path: &Path) -> Result<SbomMetadata, MalformedNameError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| MalformedNameError {
            file_name: path.display().to_string(),
        })?;

    parse_file_name(file_name)
}
