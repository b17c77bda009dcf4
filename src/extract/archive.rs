//! Archive traversal: zip (and rar, behind the `rar` feature).
//!
//! Members are staged into a temporary directory and fed back through the
//! engine one at a time, so every member gets the exact same routing,
//! ceilings, and failure containment as a top-level file. The staging
//! directory lives until the last member finishes and is then dropped.
//!
//! Ceilings enforced here:
//! - the archive file itself must fit `max_archive_bytes`
//! - at most `max_archive_members` members are processed, extras are skipped
//! - cumulative declared uncompressed size is capped at `max_archive_bytes`;
//!   members that would overshoot are skipped, not fatal
//! - member paths are sanitized, entries escaping the staging root are
//!   dropped

use crate::document::DocumentBuilder;
use crate::engine::Engine;
use crate::error::DocnormError;
use crate::limits::Limits;
use crate::router::ArchiveKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A member staged on disk, keyed by its name inside the archive.
struct StagedMember {
    name: String,
    path: PathBuf,
}

fn stage_zip(
    archive_path: &Path,
    dest: &Path,
    limits: &Limits,
) -> Result<Vec<StagedMember>, DocnormError> {
    let extraction_err = |detail: String| DocnormError::Extraction {
        path: archive_path.to_path_buf(),
        detail,
    };

    let file = std::fs::File::open(archive_path).map_err(|e| extraction_err(e.to_string()))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| extraction_err(format!("not a zip: {e}")))?;

    let mut staged = Vec::new();
    let mut total_bytes: u64 = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| extraction_err(format!("member {index}: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        if staged.len() >= limits.max_archive_members {
            warn!(
                "{}: member cap ({}) reached, skipping the rest",
                archive_path.display(),
                limits.max_archive_members
            );
            break;
        }
        if total_bytes.saturating_add(entry.size()) > limits.max_archive_bytes {
            warn!(
                "{}: '{}' would exceed the cumulative size ceiling, skipping",
                archive_path.display(),
                entry.name()
            );
            continue;
        }
        // enclosed_name rejects absolute paths and `..` traversal.
        let Some(relative) = entry.enclosed_name() else {
            warn!(
                "{}: '{}' escapes the staging root, skipping",
                archive_path.display(),
                entry.name()
            );
            continue;
        };

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| extraction_err(e.to_string()))?;
        }
        let mut out = std::fs::File::create(&target).map_err(|e| extraction_err(e.to_string()))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| extraction_err(e.to_string()))?;

        total_bytes += entry.size();
        staged.push(StagedMember {
            name: entry.name().to_string(),
            path: target,
        });
    }
    debug!(
        "{}: staged {} members ({total_bytes} bytes)",
        archive_path.display(),
        staged.len()
    );
    Ok(staged)
}

#[cfg(feature = "rar")]
fn stage_rar(
    archive_path: &Path,
    dest: &Path,
    limits: &Limits,
) -> Result<Vec<StagedMember>, DocnormError> {
    let extraction_err = |detail: String| DocnormError::Extraction {
        path: archive_path.to_path_buf(),
        detail,
    };

    let mut archive = unrar::Archive::new(archive_path)
        .open_for_processing()
        .map_err(|e| extraction_err(format!("cannot open rar: {e}")))?;

    let mut staged = Vec::new();
    let mut total_bytes: u64 = 0;
    while let Some(before_file) = archive
        .read_header()
        .map_err(|e| extraction_err(e.to_string()))?
    {
        let entry = before_file.entry();
        let name = entry.filename.to_string_lossy().into_owned();
        let size = entry.unpacked_size as u64;
        let escapes_root = entry
            .filename
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir));

        let keep = entry.is_file()
            && staged.len() < limits.max_archive_members
            && total_bytes.saturating_add(size) <= limits.max_archive_bytes
            && !escapes_root;

        archive = if keep {
            let target = dest.join(&entry.filename);
            total_bytes += size;
            let next = before_file
                .extract_with_base(dest)
                .map_err(|e| extraction_err(format!("'{name}': {e}")))?;
            staged.push(StagedMember { name, path: target });
            next
        } else {
            if entry.is_file() {
                warn!("{}: skipping '{name}'", archive_path.display());
            }
            before_file
                .skip()
                .map_err(|e| extraction_err(e.to_string()))?
        };
    }
    Ok(staged)
}

/// Extract an archive by recursing every staged member through the engine.
pub async fn extract(
    path: &Path,
    builder: &mut DocumentBuilder,
    engine: &Engine,
    kind: ArchiveKind,
    depth: usize,
) -> Result<(), DocnormError> {
    let limits = *engine.limits();
    if !limits.archive_fits(builder.byte_size()) {
        return Err(DocnormError::ArchiveTooLarge {
            path: path.to_path_buf(),
            size: builder.byte_size(),
            limit: limits.max_archive_bytes,
        });
    }

    let staging = tempfile::tempdir().map_err(|e| DocnormError::Extraction {
        path: path.to_path_buf(),
        detail: format!("cannot create staging dir: {e}"),
    })?;

    let archive_path = path.to_path_buf();
    let dest = staging.path().to_path_buf();
    let staged = tokio::task::spawn_blocking(move || match kind {
        ArchiveKind::Zip => stage_zip(&archive_path, &dest, &limits),
        #[cfg(feature = "rar")]
        ArchiveKind::Rar => stage_rar(&archive_path, &dest, &limits),
        #[cfg(not(feature = "rar"))]
        ArchiveKind::Rar => Err(DocnormError::CapabilityUnavailable {
            capability: "rar extraction".into(),
            hint: "rebuild with the 'rar' feature enabled".into(),
        }),
    })
    .await
    .map_err(|e| DocnormError::Internal(format!("archive task panicked: {e}")))??;

    builder.set_metadata("member_count", staged.len().to_string());
    for member in staged {
        match engine.process_at_depth(&member.path, depth + 1).await {
            Ok(child) => builder.merge_member(&member.name, child),
            Err(e) => {
                // A failed member costs that member only.
                warn!("{}: member '{}': {e}", path.display(), member.name);
                builder.push_text(&format!(
                    "========[{}]========\n(member could not be processed: {e})\n",
                    member.name
                ));
            }
        }
    }
    drop(staging);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut w = zip::ZipWriter::new(file);
        for (name, bytes) in entries {
            w.start_file(*name, SimpleFileOptions::default()).unwrap();
            w.write_all(bytes).unwrap();
        }
        w.finish().unwrap();
    }

    #[test]
    fn members_stage_in_order_with_directories() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("bundle.zip");
        build_zip(
            &zip_path,
            &[("a.txt", b"one"), ("sub/b.txt", b"two")],
        );

        let dest = tempfile::tempdir().unwrap();
        let staged = stage_zip(&zip_path, dest.path(), &Limits::default()).unwrap();

        assert_eq!(staged.len(), 2);
        assert_eq!(staged[0].name, "a.txt");
        assert_eq!(staged[1].name, "sub/b.txt");
        assert_eq!(std::fs::read(&staged[1].path).unwrap(), b"two");
    }

    #[test]
    fn traversal_names_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("evil.zip");
        build_zip(
            &zip_path,
            &[("../escape.txt", b"nope"), ("ok.txt", b"fine")],
        );

        let dest = tempfile::tempdir().unwrap();
        let staged = stage_zip(&zip_path, dest.path(), &Limits::default()).unwrap();

        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].name, "ok.txt");
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn member_cap_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("many.zip");
        let entries: Vec<(String, Vec<u8>)> = (0..10)
            .map(|i| (format!("f{i}.txt"), b"x".to_vec()))
            .collect();
        let borrowed: Vec<(&str, &[u8])> = entries
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        build_zip(&zip_path, &borrowed);

        let limits = Limits {
            max_archive_members: 3,
            ..Limits::default()
        };
        let dest = tempfile::tempdir().unwrap();
        let staged = stage_zip(&zip_path, dest.path(), &limits).unwrap();
        assert_eq!(staged.len(), 3);
    }

    #[test]
    fn cumulative_size_cap_skips_overshooting_members() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("fat.zip");
        build_zip(
            &zip_path,
            &[("a.txt", &[0u8; 600]), ("b.txt", &[0u8; 600]), ("c.txt", b"ok")],
        );

        let limits = Limits {
            max_archive_bytes: 1000,
            ..Limits::default()
        };
        let dest = tempfile::tempdir().unwrap();
        let staged = stage_zip(&zip_path, dest.path(), &limits).unwrap();

        let names: Vec<&str> = staged.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "c.txt"]);
    }
}
