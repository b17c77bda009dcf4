//! Folder batch processing.
//!
//! Every regular file in the folder is processed independently; one
//! document's failure never stops the batch. Outcomes come back per file so
//! the caller can report successes and failures side by side.

use crate::document::Document;
use crate::engine::Engine;
use crate::error::DocnormError;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of processing one file in a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub result: Result<Document, DocnormError>,
}

/// Process every regular file directly inside `dir`.
///
/// Files are discovered in name order and processed with the configured
/// concurrency; subdirectories are not recursed into (a nested folder is
/// not an archive).
pub async fn process_folder(
    engine: &Engine,
    dir: &Path,
) -> Result<Vec<BatchOutcome>, DocnormError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| DocnormError::Extraction {
            path: dir.to_path_buf(),
            detail: format!("cannot read folder: {e}"),
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    info!("batch: {} files in {}", paths.len(), dir.display());
    let outcomes: Vec<BatchOutcome> = stream::iter(paths)
        .map(|path| async move {
            let result = engine.process(&path).await;
            if let Err(e) = &result {
                warn!("batch: {}: {e}", path.display());
            }
            BatchOutcome { path, result }
        })
        .buffer_unordered(engine.config().batch_concurrency)
        .collect()
        .await;

    Ok(outcomes)
}
