//! Plain-text extraction: txt, source code, markup read verbatim, email.
//!
//! Real-world text files are not reliably UTF-8 — scans of old mail
//! archives arrive in legacy Cyrillic and Windows codepages. Instead of a
//! lossy `from_utf8_lossy` that turns every such file into replacement
//! characters, the bytes are sniffed with chardetng and decoded with
//! encoding_rs, the same stack the crawling repos in this ecosystem use for
//! arbitrary web bytes.

use crate::document::DocumentBuilder;
use crate::error::DocnormError;
use std::path::Path;
use tracing::debug;

/// Decode arbitrary bytes to a string, sniffing the charset first.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    // Fast path: valid UTF-8 stays untouched.
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, used, _had_errors) = encoding.decode(bytes);
    debug!("decoded text as {}", used.name());
    text.into_owned()
}

/// Read the whole file as text into `text_content`, plus basic metadata.
pub async fn extract(path: &Path, builder: &mut DocumentBuilder) -> Result<(), DocnormError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DocnormError::Extraction {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let text = decode_text(&bytes);
    builder.set_metadata("file_size", builder.byte_size().to_string());
    builder.push_text(&text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn utf8_passes_through() {
        assert_eq!(decode_text("привет".as_bytes()), "привет");
    }

    #[test]
    fn legacy_cyrillic_is_decoded() {
        // Detection needs sentence-length input; a couple of bytes is not
        // attributable to any one charset.
        let original = "Документ обработан успешно, все страницы прочитаны.";
        let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode(original);
        assert!(std::str::from_utf8(&bytes).is_err());

        let text = decode_text(&bytes);
        assert_eq!(text, original);
    }

    #[tokio::test]
    async fn reads_file_into_text_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "line one\nline two\n").unwrap();

        let mut builder = Document::builder(&path);
        extract(&path, &mut builder).await.unwrap();
        let doc = builder.finish();

        assert_eq!(doc.text_content, "line one\nline two\n");
        assert_eq!(doc.metadata.get("file_size").unwrap(), "18");
    }

    #[tokio::test]
    async fn missing_file_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        let mut builder = Document::builder(&path);
        let err = extract(&path, &mut builder).await.unwrap_err();
        assert!(matches!(err, DocnormError::Extraction { .. }));
    }
}
