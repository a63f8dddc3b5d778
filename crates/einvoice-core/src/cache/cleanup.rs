//! Removal listener that deletes the temp files behind staged results.

use std::io::ErrorKind;

use tracing::debug;
use uuid::Uuid;

use super::{RemovalCause, RemovalListener};
use crate::error::CacheCleanupError;
use crate::models::result::PipelineResult;

/// Deletes the staged upload and rendered artifact of a removed result.
///
/// Replacements are ignored: a result re-put under the same id refers to the
/// same staged files.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagedFileCleanup;

impl RemovalListener<Uuid, PipelineResult> for StagedFileCleanup {
    fn on_removal(&self, id: &Uuid, result: &PipelineResult, cause: RemovalCause) -> Result<(), CacheCleanupError> {
        if cause == RemovalCause::Replaced {
            return Ok(());
        }

        let mut failures = Vec::new();
        for path in result.backing_files() {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Deleted {} of {} ({:?})", path.display(), id, cause),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} of {} already gone", path.display(), id)
                }
                Err(source) => failures.push(CacheCleanupError::Delete {
                    path: path.to_path_buf(),
                    source,
                }),
            }
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(CacheCleanupError::Multiple(failures)),
        }
    }
}
