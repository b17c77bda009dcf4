//! Office-to-PDF conversion via the LibreOffice `soffice` executable.
//!
//! Editable office formats (doc/docx/ppt/pptx) are not parsed here; they are
//! converted to a fixed-layout PDF first and then take the paged-document
//! path. The converter is a synchronous external collaborator modeled as a
//! subprocess call with an explicit timeout and typed failures — never a raw
//! subprocess surface leaking into the engine.
//!
//! Executable lookup order mirrors the conventional deployment story:
//! 1. `EngineConfig::soffice_path` (explicit wins)
//! 2. the `SOFFICE_PATH` environment variable
//! 3. a `soffice` binary on PATH
//! 4. the macOS application-bundle default location

use crate::config::EngineConfig;
use crate::error::DocnormError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Locate the LibreOffice `soffice` executable.
///
/// A missing binary is a capability gap, not a transient error: the caller
/// fails that input with [`DocnormError::CapabilityUnavailable`].
pub fn find_soffice(configured: Option<&Path>) -> Result<PathBuf, DocnormError> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(p) = configured {
        candidates.push(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("SOFFICE_PATH") {
        if !p.is_empty() {
            candidates.push(PathBuf::from(p));
        }
    }
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            candidates.push(dir.join("soffice"));
        }
    }
    candidates.push(PathBuf::from(
        "/Applications/LibreOffice.app/Contents/MacOS/soffice",
    ));

    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| DocnormError::CapabilityUnavailable {
            capability: "office-to-pdf conversion".into(),
            hint: "LibreOffice 'soffice' executable not found. \
                   Install LibreOffice or set env var SOFFICE_PATH."
                .into(),
        })
}

/// Convert an editable office document to a PDF in `out_dir`.
///
/// Returns the path of the produced PDF. The converted file's lifecycle
/// belongs to the caller's staging directory, not to this function.
pub async fn convert_to_pdf(
    input: &Path,
    out_dir: &Path,
    config: &EngineConfig,
) -> Result<PathBuf, DocnormError> {
    let soffice = find_soffice(config.soffice_path.as_deref())?;
    info!("Converting {} to PDF via {}", input.display(), soffice.display());

    let run = Command::new(&soffice)
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(out_dir)
        .arg(input)
        .output();

    let output = timeout(Duration::from_secs(config.convert_timeout_secs), run)
        .await
        .map_err(|_| DocnormError::ConversionTimeout {
            path: input.to_path_buf(),
            secs: config.convert_timeout_secs,
        })?
        .map_err(|e| DocnormError::Conversion {
            path: input.to_path_buf(),
            detail: format!("failed to launch soffice: {e}"),
        })?;

    if !output.status.success() {
        return Err(DocnormError::Conversion {
            path: input.to_path_buf(),
            detail: format!(
                "soffice exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    // soffice names the output after the input stem.
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pdf_path = out_dir.join(format!("{stem}.pdf"));

    if !pdf_path.exists() {
        return Err(DocnormError::Conversion {
            path: input.to_path_buf(),
            detail: format!("expected output '{}' was not produced", pdf_path.display()),
        });
    }

    debug!("Converted to {}", pdf_path.display());
    Ok(pdf_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_soffice_is_capability_gap() {
        // A configured path that does not exist must not fall through to a
        // generic error.
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("no-such-soffice");
        // Clear PATH influence by pointing at an empty dir through config:
        // even if a real soffice is on PATH, the explicit candidate list is
        // only consulted for existence, so we just assert the error type on
        // a host without LibreOffice OR that a found path is a file.
        match find_soffice(Some(&bogus)) {
            Ok(found) => assert!(found.is_file()),
            Err(e) => assert!(matches!(e, DocnormError::CapabilityUnavailable { .. })),
        }
    }
}
