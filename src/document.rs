//! The unified output record every extractor produces.
//!
//! A [`Document`] is an immutable value: identity of the source file plus
//! the four normalized channels (text, images, tables, metadata). It is
//! assembled through a [`DocumentBuilder`] owned by exactly one extraction
//! run and frozen by [`DocumentBuilder::finish`]; nothing mutates it
//! afterward. Concurrent documents never share a builder.
//!
//! Image entries are *references* to files persisted under the engine's
//! images directory — dropping a `Document` does not delete them; retention
//! is the cleanup collaborator's job.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Normalized representation of one ingested file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Path the file was read from.
    pub source_path: PathBuf,
    /// Base name of the source file.
    pub file_name: String,
    /// Lower-cased extension including the dot (e.g. `".pdf"`), empty when
    /// the file has none.
    pub extension: String,
    /// Source file size in bytes.
    pub byte_size: u64,
    /// Container / EXIF / format metadata, unordered.
    pub metadata: HashMap<String, String>,
    /// Accumulated text in page/block order.
    pub text_content: String,
    /// Paths of persisted images, in extraction order.
    pub images: Vec<PathBuf>,
    /// Serialized table representations (one string per table/sheet).
    pub tables: Vec<String>,
}

impl Document {
    /// Start building a document for the given source file.
    ///
    /// `byte_size` is read here once; extractors must not re-stat the file.
    #[must_use]
    pub fn builder(source_path: &Path) -> DocumentBuilder {
        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = source_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let byte_size = std::fs::metadata(source_path).map(|m| m.len()).unwrap_or(0);

        DocumentBuilder {
            doc: Document {
                source_path: source_path.to_path_buf(),
                file_name,
                extension,
                byte_size,
                metadata: HashMap::new(),
                text_content: String::new(),
                images: Vec::new(),
                tables: Vec::new(),
            },
        }
    }

    /// The source file name without its extension, used to derive
    /// collision-free persisted-image names.
    #[must_use]
    pub fn stem(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map_or(self.file_name.as_str(), |(stem, _)| stem)
    }
}

/// Accumulates a [`Document`] across the private steps of one extraction.
#[derive(Debug)]
pub struct DocumentBuilder {
    doc: Document,
}

impl DocumentBuilder {
    /// Source file name without extension (for derived artifact names).
    #[must_use]
    pub fn stem(&self) -> String {
        self.doc.stem().to_string()
    }

    /// Lower-cased source extension including the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.doc.extension
    }

    /// Source byte size recorded at builder creation.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.doc.byte_size
    }

    /// Append a text fragment in document order.
    pub fn push_text(&mut self, text: &str) {
        self.doc.text_content.push_str(text);
    }

    /// Record a persisted image path.
    pub fn add_image(&mut self, path: PathBuf) {
        self.doc.images.push(path);
    }

    /// Record a serialized table.
    pub fn add_table(&mut self, table: String) {
        self.doc.tables.push(table);
    }

    /// Insert one metadata entry (last writer wins, map is unordered).
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.doc.metadata.insert(key.into(), value.into());
    }

    /// Merge a fully processed child document (an archive member) into this
    /// one: text is appended under a member-name header, image and table
    /// lists are extended, metadata keys are namespaced by member name.
    pub fn merge_member(&mut self, member_name: &str, child: Document) {
        self.doc
            .text_content
            .push_str(&format!("========[{member_name}]========\n"));
        self.doc.text_content.push_str(&child.text_content);
        if !self.doc.text_content.ends_with('\n') {
            self.doc.text_content.push('\n');
        }
        self.doc.images.extend(child.images);
        self.doc.tables.extend(child.tables);
        for (k, v) in child.metadata {
            self.doc.metadata.insert(format!("{member_name}:{k}"), v);
        }
    }

    /// Freeze the accumulated state into the final immutable record.
    #[must_use]
    pub fn finish(self) -> Document {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_captures_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Report.PDF");
        std::fs::write(&path, b"12345").unwrap();

        let doc = Document::builder(&path).finish();
        assert_eq!(doc.file_name, "Report.PDF");
        assert_eq!(doc.extension, ".pdf");
        assert_eq!(doc.byte_size, 5);
        assert_eq!(doc.stem(), "Report");
    }

    #[test]
    fn missing_extension_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("README");
        std::fs::write(&path, b"x").unwrap();

        let doc = Document::builder(&path).finish();
        assert_eq!(doc.extension, "");
        assert_eq!(doc.stem(), "README");
    }

    #[test]
    fn merge_member_appends_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let parent_path = dir.path().join("bundle.zip");
        let child_path = dir.path().join("note.txt");
        std::fs::write(&parent_path, b"z").unwrap();
        std::fs::write(&child_path, b"hello").unwrap();

        let mut child = Document::builder(&child_path);
        child.push_text("hello");
        child.add_image(PathBuf::from("images/note.png"));
        child.add_table("a\tb".into());
        child.set_metadata("Author", "x");
        let child = child.finish();

        let mut parent = Document::builder(&parent_path);
        parent.merge_member("note.txt", child);
        let parent = parent.finish();

        assert!(parent.text_content.starts_with("========[note.txt]========\n"));
        assert!(parent.text_content.contains("hello"));
        assert_eq!(parent.images.len(), 1);
        assert_eq!(parent.tables.len(), 1);
        assert_eq!(parent.metadata.get("note.txt:Author").unwrap(), "x");
    }

    #[test]
    fn document_serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"t").unwrap();

        let mut b = Document::builder(&path);
        b.push_text("t");
        let json = serde_json::to_string(&b.finish()).unwrap();
        assert!(json.contains("\"text_content\":\"t\""));
    }
}
