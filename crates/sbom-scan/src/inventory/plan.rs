use std::collections::HashSet;
use std::path::PathBuf;

use tracing::warn;

use super::metadata::{parse_path, MalformedNameError};
use crate::scheduler::{JobId, ScanJob};

/// Jobs ready for scheduling plus the file names that could not be parsed.
#[derive(Debug, Default)]
pub struct ScanPlan {
    pub jobs: Vec<ScanJob>,
    pub rejected: Vec<MalformedNameError>,
}

impl ScanPlan {
    /// Builds one job per distinct, well-formed path. Ids follow input order.
    pub fn from_paths<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut seen = HashSet::new();
        let mut plan = ScanPlan::default();

        for path in paths {
            if !seen.insert(path.clone()) {
                continue;
            }

            match parse_path(&path) {
                Ok(metadata) => {
                    let id = JobId(plan.jobs.len() as u32 + 1);
                    plan.jobs.push(ScanJob::new(id, path, metadata));
                }
                Err(err) => {
                    warn!(file = %err.file_name, "skipping file with malformed name");
                    plan.rejected.push(err);
                }
            }
        }

        plan
    }
}
