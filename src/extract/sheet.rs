//! Spreadsheet extraction: xlsx/xls workbooks via calamine, plus CSV.
//!
//! Every sheet is serialized as tab-separated rows and recorded twice: once
//! in the running text (under a sheet banner, so the reading order survives)
//! and once as a standalone table entry. A sheet that fails to parse costs
//! that sheet only.

use crate::document::DocumentBuilder;
use crate::error::DocnormError;
use calamine::{open_workbook_auto, Reader};
use std::path::Path;
use tracing::{debug, warn};

/// One serialized worksheet.
struct SheetBlock {
    name: String,
    rows: String,
}

fn read_workbook(path: &Path) -> Result<Vec<SheetBlock>, DocnormError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| DocnormError::Extraction {
        path: path.to_path_buf(),
        detail: format!("cannot open workbook: {e}"),
    })?;

    let names = workbook.sheet_names().to_owned();
    let mut blocks = Vec::with_capacity(names.len());
    for name in names {
        let range = match workbook.worksheet_range(&name) {
            Ok(r) => r,
            Err(e) => {
                warn!("sheet '{name}' in {}: {e}; skipping", path.display());
                continue;
            }
        };
        let mut rows = String::new();
        for row in range.rows() {
            let line: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
            rows.push_str(&line.join("\t"));
            rows.push('\n');
        }
        debug!("sheet '{name}': {} rows", range.height());
        blocks.push(SheetBlock { name, rows });
    }
    Ok(blocks)
}

/// Extract every worksheet of an xlsx/xls workbook.
pub async fn extract_workbook(
    path: &Path,
    builder: &mut DocumentBuilder,
) -> Result<(), DocnormError> {
    let p = path.to_path_buf();
    let blocks = tokio::task::spawn_blocking(move || read_workbook(&p))
        .await
        .map_err(|e| DocnormError::Internal(format!("workbook task panicked: {e}")))??;

    builder.set_metadata("sheet_count", blocks.len().to_string());
    for block in blocks {
        builder.push_text(&format!("========[Sheet: {}]========\n", block.name));
        builder.push_text(&block.rows);
        builder.add_table(format!("Sheet: {}\n{}", block.name, block.rows));
    }
    Ok(())
}

/// Extract a CSV file: decoded verbatim into the text, and recorded as one
/// table entry.
pub async fn extract_csv(path: &Path, builder: &mut DocumentBuilder) -> Result<(), DocnormError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DocnormError::Extraction {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    let text = super::text::decode_text(&bytes);
    builder.push_text(&text);
    builder.add_table(text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[tokio::test]
    async fn csv_lands_in_text_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let mut builder = Document::builder(&path);
        extract_csv(&path, &mut builder).await.unwrap();
        let doc = builder.finish();

        assert_eq!(doc.text_content, "a,b\n1,2\n");
        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0], "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn corrupt_workbook_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"this is not a workbook").unwrap();

        let mut builder = Document::builder(&path);
        let err = extract_workbook(&path, &mut builder).await.unwrap_err();
        assert!(matches!(err, DocnormError::Extraction { .. }));
    }
}
