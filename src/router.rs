//! Format routing: file extension → extraction strategy.
//!
//! Dispatch is an explicit tagged enum ([`FormatFamily`]) matched against a
//! fixed extension table, so the full set of supported formats is visible
//! in one place and adding a format is a compile-checked change. Office
//! formats route through the [`crate::office`] converter first and then
//! take the paged path.
//!
//! The temporary-artifact refusal runs before anything else: office
//! applications litter directories with lock/owner files (`~$report.docx`,
//! `.~lock.report.odt#`) that look like documents to an extension table but
//! must never be processed.

use crate::error::DocnormError;
use std::path::Path;

/// The format families the engine knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    /// Fixed-layout paged documents (PDF).
    Paged,
    /// Editable office formats; converted to PDF, then processed as `Paged`.
    Office,
    /// Raster images.
    Image,
    /// Spreadsheet containers and CSV.
    Spreadsheet,
    /// Plain and structured text read verbatim.
    PlainText,
    /// Markdown, stripped to plain text.
    Markdown,
    /// Rich Text Format, stripped to plain text.
    Rtf,
    /// OpenDocument text (zip + content.xml).
    Odt,
    /// EPUB e-books (zip + xhtml members).
    Epub,
    /// Apple iWork containers (zip + QuickLook preview PDF).
    IWork,
    /// Zip/rar containers traversed member-by-member.
    Archive(ArchiveKind),
}

/// Which archive reader a container needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Rar,
}

/// Raster extensions accepted by the image extractor.
const IMAGE_EXTS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "gif", "tiff", "tif", "bmp", "webp",
];

impl FormatFamily {
    /// Map a lower-cased extension (without the dot) to its family.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        if IMAGE_EXTS.contains(&ext) {
            return Some(FormatFamily::Image);
        }
        match ext {
            "pdf" => Some(FormatFamily::Paged),
            "docx" | "doc" | "pptx" | "ppt" => Some(FormatFamily::Office),
            "xlsx" | "xls" | "csv" => Some(FormatFamily::Spreadsheet),
            "txt" | "json" | "py" | "html" | "cms" | "css" | "eml" | "mbox" => {
                Some(FormatFamily::PlainText)
            }
            "md" | "markdown" => Some(FormatFamily::Markdown),
            "rtf" => Some(FormatFamily::Rtf),
            "odt" => Some(FormatFamily::Odt),
            "epub" => Some(FormatFamily::Epub),
            "pages" | "numbers" => Some(FormatFamily::IWork),
            "zip" => Some(FormatFamily::Archive(ArchiveKind::Zip)),
            "rar" => Some(FormatFamily::Archive(ArchiveKind::Rar)),
            _ => None,
        }
    }
}

/// Does the filename match a known office lock/owner naming convention?
#[must_use]
pub fn is_temporary_artifact(file_name: &str) -> bool {
    // MS Office owner files and LibreOffice lock files.
    file_name.starts_with("~$")
        || (file_name.starts_with(".~lock.") && file_name.ends_with('#'))
}

/// Route a path to its format family.
///
/// Refuses temporary artifacts first (before any filesystem access beyond
/// the name itself), then maps the lower-cased extension.
pub fn route(path: &Path) -> Result<FormatFamily, DocnormError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if is_temporary_artifact(&file_name) {
        return Err(DocnormError::TemporaryArtifact { name: file_name });
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    FormatFamily::from_extension(&ext).ok_or(DocnormError::UnsupportedFormat {
        extension: if ext.is_empty() {
            "(none)".to_string()
        } else {
            format!(".{ext}")
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(
            route(&PathBuf::from("scan.PDF")).unwrap(),
            FormatFamily::Paged
        );
        assert_eq!(
            route(&PathBuf::from("photo.JPEG")).unwrap(),
            FormatFamily::Image
        );
    }

    #[test]
    fn office_formats_route_to_conversion() {
        for name in ["a.docx", "a.doc", "a.pptx", "a.ppt"] {
            assert_eq!(route(&PathBuf::from(name)).unwrap(), FormatFamily::Office);
        }
    }

    #[test]
    fn archives_carry_their_kind() {
        assert_eq!(
            route(&PathBuf::from("bundle.zip")).unwrap(),
            FormatFamily::Archive(ArchiveKind::Zip)
        );
        assert_eq!(
            route(&PathBuf::from("bundle.rar")).unwrap(),
            FormatFamily::Archive(ArchiveKind::Rar)
        );
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = route(&PathBuf::from("a.xyz")).unwrap_err();
        assert!(matches!(err, DocnormError::UnsupportedFormat { .. }));
        let err = route(&PathBuf::from("no_extension")).unwrap_err();
        assert!(matches!(err, DocnormError::UnsupportedFormat { .. }));
    }

    #[test]
    fn lock_files_are_refused_before_anything_else() {
        let err = route(&PathBuf::from("~$report.docx")).unwrap_err();
        assert!(matches!(err, DocnormError::TemporaryArtifact { .. }));
        let err = route(&PathBuf::from(".~lock.report.odt#")).unwrap_err();
        assert!(matches!(err, DocnormError::TemporaryArtifact { .. }));
    }

    #[test]
    fn lock_prefix_requires_trailing_hash() {
        assert!(!is_temporary_artifact(".~lockish.txt"));
        assert!(is_temporary_artifact(".~lock.a.odt#"));
        assert!(!is_temporary_artifact("normal.odt"));
    }
}
