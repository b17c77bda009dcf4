//! Per-format extraction strategies.
//!
//! Each submodule implements one strategy of the format dispatch:
//!
//! 1. [`paged`]   — fixed-layout documents via pdfium; the only strategy
//!    with per-page vision quotas
//! 2. [`image`]   — standalone raster images (orientation, downscale,
//!    single description)
//! 3. [`sheet`]   — spreadsheet containers and CSV
//! 4. [`text`]    — plain/structured text read verbatim
//! 5. [`markup`]  — markdown/RTF/ODT/EPUB stripped to plain text
//! 6. [`archive`] — zip/rar traversal recursing members through the engine
//!
//! Strategies mutate the one [`crate::document::DocumentBuilder`] owned by
//! their extraction run and never touch shared state; the helpers below are
//! the two operations every image-bearing strategy needs (persist, describe
//! with degradation).

pub mod archive;
pub mod image;
pub mod markup;
pub mod paged;
pub mod sheet;
pub mod text;

use crate::describe::DescriptionService;
use crate::error::DocnormError;
use crate::prompts::FAILURE_PLACEHOLDER;
use ::image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Persist an image under the engine's images directory.
///
/// The output format is inferred from the file name's extension.
pub(crate) fn persist_image(
    img: &DynamicImage,
    dir: &Path,
    name: &str,
) -> Result<PathBuf, DocnormError> {
    let path = dir.join(name);
    img.save(&path).map_err(|e| DocnormError::OutputWriteFailed {
        path: path.clone(),
        source: std::io::Error::other(e),
    })?;
    Ok(path)
}

/// Run one description call, degrading any failure to the fixed placeholder.
///
/// This is the containment point for per-call failures: a timeout or
/// provider error costs exactly one description, never the document.
pub(crate) async fn describe_or_placeholder(
    service: &dyn DescriptionService,
    image: &DynamicImage,
    context: &str,
) -> String {
    match service.describe(image).await {
        Ok(description) => description,
        Err(e) => {
            warn!("{context}: {e}; substituting placeholder");
            FAILURE_PLACEHOLDER.to_string()
        }
    }
}
