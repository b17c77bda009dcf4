//! Structured-text extraction: markdown, RTF, ODT, EPUB, iWork containers.
//!
//! All of these carry formatting the downstream extraction model does not
//! want; the job here is to strip markers and produce plain reading-order
//! text. The zip-backed formats (ODT, EPUB, iWork) are read with bounded
//! entry sizes so a crafted container cannot balloon memory.

use crate::document::DocumentBuilder;
use crate::error::DocnormError;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum decompressed bytes read from a single zip entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

// ── Markdown ─────────────────────────────────────────────────────────────

static RE_FENCE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^```.*$\n?").unwrap());
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static RE_BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^>\s?").unwrap());
static RE_HRULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:-{3,}|\*{3,}|_{3,})[ \t]*$\n?").unwrap());
static RE_TABLE_SEP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\|?[-:|\s]+\|\s*$\n?").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").unwrap());
static RE_EMPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static RE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").unwrap());
static RE_BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strip markdown formatting markers, keeping the readable text.
///
/// Ordered passes: fences before horizontal rules (a fence line is not a
/// rule), images before links (an image is a `!` plus a link), table
/// separator rows before pipes are rewritten.
pub fn markdown_to_text(input: &str) -> String {
    let s = RE_FENCE_LINE.replace_all(input, "");
    let s = RE_IMAGE.replace_all(&s, "$1");
    let s = RE_LINK.replace_all(&s, "$1");
    let s = RE_HEADING.replace_all(&s, "");
    let s = RE_BLOCKQUOTE.replace_all(&s, "");
    let s = RE_TABLE_SEP.replace_all(&s, "");
    let s = RE_HRULE.replace_all(&s, "");
    let s = RE_BOLD.replace_all(&s, "$1$2");
    let s = RE_EMPH.replace_all(&s, "$1");
    let s = RE_CODE.replace_all(&s, "$1");
    let s = s.replace(" | ", "\t").replace('|', "");
    RE_BLANKS.replace_all(&s, "\n\n").trim().to_string()
}

// ── RTF ──────────────────────────────────────────────────────────────────

/// Destination groups whose content is metadata, not document text.
const RTF_SKIP_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "header",
    "footer",
    "generator",
];

/// Strip RTF control words and groups, keeping the readable text.
///
/// A small state machine over the byte stream: control words are consumed,
/// destination groups (font tables, embedded pictures, …) are skipped by
/// brace counting, `\'hh` hex escapes and `\uN` unicode escapes are decoded.
pub fn rtf_to_text(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::new();
    let mut i = 0;
    let mut skip_depth: Option<usize> = None;
    let mut depth = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                if let Some(d) = skip_depth {
                    if depth == d {
                        skip_depth = None;
                    }
                }
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b'\\' => {
                i += 1;
                if i >= bytes.len() {
                    break;
                }
                match bytes[i] {
                    // Escaped literals.
                    b'\\' | b'{' | b'}' => {
                        if skip_depth.is_none() {
                            out.push(bytes[i] as char);
                        }
                        i += 1;
                    }
                    // \'hh — codepage byte (decoded as latin-1 best effort).
                    b'\'' => {
                        if i + 2 < bytes.len() {
                            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("20");
                            if let Ok(v) = u8::from_str_radix(hex, 16) {
                                if skip_depth.is_none() {
                                    out.push(v as char);
                                }
                            }
                            i += 3;
                        } else {
                            i = bytes.len();
                        }
                    }
                    b'*' => {
                        // {\*\dest …} — unknown destination, skip the group.
                        if skip_depth.is_none() {
                            skip_depth = Some(depth);
                        }
                        i += 1;
                    }
                    _ => {
                        // Control word: letters, optional signed number, optional space.
                        let start = i;
                        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                            i += 1;
                        }
                        let word = std::str::from_utf8(&bytes[start..i]).unwrap_or("");
                        let num_start = i;
                        if i < bytes.len() && (bytes[i] == b'-' || bytes[i].is_ascii_digit()) {
                            i += 1;
                            while i < bytes.len() && bytes[i].is_ascii_digit() {
                                i += 1;
                            }
                        }
                        let param: Option<i32> =
                            std::str::from_utf8(&bytes[num_start..i]).ok().and_then(|s| s.parse().ok());
                        if i < bytes.len() && bytes[i] == b' ' {
                            i += 1;
                        }

                        if skip_depth.is_none() {
                            if RTF_SKIP_DESTINATIONS.contains(&word) {
                                skip_depth = Some(depth);
                            } else {
                                match word {
                                    "par" | "line" | "sect" | "page" => out.push('\n'),
                                    "tab" => out.push('\t'),
                                    "u" => {
                                        if let Some(v) = param {
                                            if let Some(c) = char::from_u32(v.rem_euclid(65536) as u32)
                                            {
                                                out.push(c);
                                            }
                                            // The replacement byte after \uN is a fallback
                                            // for non-unicode readers; drop it.
                                            if i < bytes.len() && bytes[i] == b'?' {
                                                i += 1;
                                            }
                                        }
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
            }
            b'\r' | b'\n' => i += 1,
            _ => {
                if skip_depth.is_none() {
                    out.push(b as char);
                }
                i += 1;
            }
        }
    }

    RE_BLANKS.replace_all(&out, "\n\n").trim().to_string()
}

// ── Zip-backed formats ───────────────────────────────────────────────────

fn open_zip(path: &Path) -> Result<zip::ZipArchive<std::fs::File>, DocnormError> {
    let file = std::fs::File::open(path).map_err(|e| DocnormError::Extraction {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    zip::ZipArchive::new(file).map_err(|e| DocnormError::Extraction {
        path: path.to_path_buf(),
        detail: format!("not a zip container: {e}"),
    })
}

/// Read up to `limit` bytes; `None` when the source holds more than that.
///
/// Reads one byte past the limit so an entry of exactly `limit` bytes is
/// accepted.
fn read_capped(reader: impl Read, limit: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut out = Vec::new();
    reader.take(limit + 1).read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(out))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::fs::File>,
    name: &str,
    source: &Path,
) -> Result<Vec<u8>, DocnormError> {
    let entry = archive.by_name(name).map_err(|e| DocnormError::Extraction {
        path: source.to_path_buf(),
        detail: format!("missing zip entry '{name}': {e}"),
    })?;
    read_capped(entry, MAX_XML_ENTRY_BYTES)
        .map_err(|e| DocnormError::Extraction {
            path: source.to_path_buf(),
            detail: e.to_string(),
        })?
        .ok_or_else(|| DocnormError::Extraction {
            path: source.to_path_buf(),
            detail: format!("zip entry '{name}' exceeds {MAX_XML_ENTRY_BYTES}-byte limit"),
        })
}

/// Collect character data from XML, inserting newlines after block elements.
fn xml_to_text(xml: &[u8], block_elements: &[&[u8]], lenient: bool) -> Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    if lenient {
        reader.config_mut().check_end_names = false;
    }
    let mut buf = Vec::new();
    let mut suppress = 0usize; // inside <style>/<script>
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if matches!(e.local_name().as_ref(), b"style" | b"script") {
                    suppress += 1;
                }
            }
            Ok(Event::Text(t)) => {
                if suppress == 0 {
                    let text = t.unescape().unwrap_or_default();
                    if !text.is_empty() {
                        if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                            out.push(' ');
                        }
                        out.push_str(text.as_ref());
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if matches!(name.as_ref(), b"style" | b"script") {
                    suppress = suppress.saturating_sub(1);
                } else if block_elements.contains(&name.as_ref()) {
                    out.push('\n');
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"br" {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) if lenient => {
                // Tolerate tag soup in e-book HTML; keep what we have.
                debug!("lenient xml walk stopped early: {e}");
                break;
            }
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

/// ODT: text lives in `content.xml`; paragraphs and headings are blocks.
pub fn odt_to_text(path: &Path) -> Result<String, DocnormError> {
    let mut archive = open_zip(path)?;
    let xml = read_zip_entry_bounded(&mut archive, "content.xml", path)?;
    xml_to_text(&xml, &[b"p", b"h"], false).map_err(|detail| DocnormError::Extraction {
        path: path.to_path_buf(),
        detail,
    })
}

/// EPUB: concatenate every xhtml member's text in container order.
pub fn epub_to_text(path: &Path) -> Result<String, DocnormError> {
    let mut archive = open_zip(path)?;
    let chapter_names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|n| {
            let lower = n.to_lowercase();
            lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
        })
        .collect();

    let mut out = String::new();
    for name in chapter_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, path)?;
        match xml_to_text(
            &xml,
            &[b"p", b"div", b"li", b"h1", b"h2", b"h3", b"h4", b"h5", b"h6", b"title"],
            true,
        ) {
            Ok(text) if !text.is_empty() => {
                out.push_str(&text);
                out.push('\n');
            }
            Ok(_) => {}
            Err(detail) => warn!("epub member '{name}': {detail}; skipping"),
        }
    }

    if out.is_empty() {
        return Err(DocnormError::Extraction {
            path: path.to_path_buf(),
            detail: "no readable xhtml members".into(),
        });
    }
    Ok(out)
}

/// iWork containers carry a QuickLook preview PDF; extract it for the
/// paged-document path. The `.iwa` payload itself is an undocumented
/// protobuf stream and is not parsed.
pub fn extract_iwork_preview(path: &Path, out_dir: &Path) -> Result<PathBuf, DocnormError> {
    let mut archive = open_zip(path)?;
    let preview_name = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .find(|n| n.to_lowercase().ends_with("preview.pdf"))
        .ok_or_else(|| DocnormError::Extraction {
            path: path.to_path_buf(),
            detail: "no QuickLook preview PDF in iWork container".into(),
        })?;

    let bytes = read_zip_entry_bounded(&mut archive, &preview_name, path)?;
    let out_path = out_dir.join("preview.pdf");
    std::fs::write(&out_path, bytes).map_err(|e| DocnormError::OutputWriteFailed {
        path: out_path.clone(),
        source: e,
    })?;
    Ok(out_path)
}

// ── Entry points used by the engine ──────────────────────────────────────

/// Markdown file → stripped plain text.
pub async fn extract_markdown(path: &Path, builder: &mut DocumentBuilder) -> Result<(), DocnormError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| DocnormError::Extraction {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    builder.push_text(&markdown_to_text(&super::text::decode_text(&bytes)));
    Ok(())
}

/// RTF file → stripped plain text.
pub async fn extract_rtf(path: &Path, builder: &mut DocumentBuilder) -> Result<(), DocnormError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| DocnormError::Extraction {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    builder.push_text(&rtf_to_text(&super::text::decode_text(&bytes)));
    Ok(())
}

/// ODT file → plain text (blocking zip/xml work off the async thread).
pub async fn extract_odt(path: &Path, builder: &mut DocumentBuilder) -> Result<(), DocnormError> {
    let p = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || odt_to_text(&p))
        .await
        .map_err(|e| DocnormError::Internal(format!("odt task panicked: {e}")))??;
    builder.push_text(&text);
    Ok(())
}

/// EPUB file → plain text.
pub async fn extract_epub(path: &Path, builder: &mut DocumentBuilder) -> Result<(), DocnormError> {
    let p = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || epub_to_text(&p))
        .await
        .map_err(|e| DocnormError::Internal(format!("epub task panicked: {e}")))??;
    builder.push_text(&text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    #[test]
    fn markdown_markers_are_stripped() {
        let md = "# Title\n\nSome **bold** and *em* and `code`.\n\n- [link](http://x)\n\n---\n";
        let text = markdown_to_text(md);
        assert!(text.contains("Title"));
        assert!(text.contains("Some bold and em and code."));
        assert!(text.contains("link"));
        assert!(!text.contains('#'));
        assert!(!text.contains("**"));
        assert!(!text.contains("http://x"));
        assert!(!text.contains("---"));
    }

    #[test]
    fn markdown_image_keeps_alt_text() {
        assert_eq!(markdown_to_text("![a chart](img.png)"), "a chart");
    }

    #[test]
    fn rtf_basic_text_survives() {
        let rtf = r"{\rtf1\ansi{\fonttbl{\f0 Arial;}}\f0\fs24 Hello \b World\b0\par second line\par}";
        let text = rtf_to_text(rtf);
        assert!(text.contains("Hello World"), "got: {text}");
        assert!(text.contains("second line"));
        assert!(!text.contains("Arial"));
        assert!(!text.contains("\\b"));
    }

    #[test]
    fn rtf_hex_and_unicode_escapes() {
        // \u1055 is 'П'; the trailing '?' is the non-unicode fallback and must vanish.
        let rtf = "{\\rtf1 caf\\'e9 \\u1055? }";
        let text = rtf_to_text(rtf);
        assert!(text.contains("café"), "got: {text}");
        assert!(text.contains('П'), "got: {text}");
        assert!(!text.contains('?'), "got: {text}");
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut w = zip::ZipWriter::new(file);
        for (name, bytes) in entries {
            w.start_file(*name, SimpleFileOptions::default()).unwrap();
            w.write_all(bytes).unwrap();
        }
        w.finish().unwrap();
    }

    #[test]
    fn capped_read_accepts_exactly_at_limit() {
        let data = [0u8; 64];
        assert_eq!(read_capped(&data[..], 64).unwrap().unwrap().len(), 64);
        assert!(read_capped(&data[..], 63).unwrap().is_none());
        assert_eq!(read_capped(&data[..], 65).unwrap().unwrap().len(), 64);
    }

    #[test]
    fn odt_paragraphs_become_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.odt");
        let content = br#"<?xml version="1.0"?>
<office:document-content xmlns:office="o" xmlns:text="t">
  <office:body><office:text>
    <text:p>First paragraph</text:p>
    <text:p>Second paragraph</text:p>
  </office:text></office:body>
</office:document-content>"#;
        write_zip(&path, &[("content.xml", content)]);

        let text = odt_to_text(&path).unwrap();
        assert!(text.contains("First paragraph\n"), "got: {text}");
        assert!(text.contains("Second paragraph"));
    }

    #[test]
    fn epub_chapters_are_concatenated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        write_zip(
            &path,
            &[
                ("mimetype", b"application/epub+zip".as_slice()),
                (
                    "ch1.xhtml",
                    b"<html><body><p>Chapter one.</p></body></html>".as_slice(),
                ),
                (
                    "ch2.xhtml",
                    b"<html><body><p>Chapter two.</p></body></html>".as_slice(),
                ),
            ],
        );

        let text = epub_to_text(&path).unwrap();
        assert!(text.contains("Chapter one."));
        assert!(text.contains("Chapter two."));
    }

    #[test]
    fn iwork_without_preview_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pages");
        write_zip(&path, &[("Index/Document.iwa", b"\x00\x01".as_slice())]);

        let err = extract_iwork_preview(&path, dir.path()).unwrap_err();
        assert!(matches!(err, DocnormError::Extraction { .. }));
    }

    #[test]
    fn iwork_preview_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pages");
        write_zip(
            &path,
            &[("QuickLook/Preview.pdf", b"%PDF-1.4 fake".as_slice())],
        );

        let out = extract_iwork_preview(&path, dir.path()).unwrap();
        assert_eq!(std::fs::read(out).unwrap(), b"%PDF-1.4 fake");
    }
}
