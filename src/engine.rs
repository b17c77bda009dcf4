//! The normalization engine: one entry point per file, recursion for
//! archive members.
//!
//! [`Engine::process`] runs the fixed sequence every input goes through:
//! route by name (refusing temporary artifacts before any filesystem
//! access), open-check the file, then dispatch to the format family's
//! extractor. Archive members re-enter through [`Engine::process_at_depth`]
//! with an incremented depth, so ceilings and containment apply uniformly
//! at every nesting level.

use crate::config::EngineConfig;
use crate::describe::{resolve_describer, DescriptionService};
use crate::document::Document;
use crate::error::DocnormError;
use crate::limits::Limits;
use crate::router::{route, ArchiveKind, FormatFamily};
use crate::{extract, office};
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Document normalization engine.
///
/// Construction resolves the description service once and creates the
/// images directory; per-file work never mutates engine state, so one
/// engine can serve concurrent [`process`](Engine::process) calls.
pub struct Engine {
    config: EngineConfig,
    describer: Arc<dyn DescriptionService>,
}

impl Engine {
    /// Build an engine from a validated configuration.
    pub fn new(config: EngineConfig) -> Result<Self, DocnormError> {
        std::fs::create_dir_all(&config.images_dir).map_err(|e| {
            DocnormError::OutputWriteFailed {
                path: config.images_dir.clone(),
                source: e,
            }
        })?;
        let describer = resolve_describer(&config);
        info!(
            "engine ready (images dir: {}, rar: {})",
            config.images_dir.display(),
            cfg!(feature = "rar")
        );
        Ok(Self { config, describer })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn limits(&self) -> &Limits {
        &self.config.limits
    }

    /// Whether this build can read rar archives.
    pub fn supports_rar(&self) -> bool {
        cfg!(feature = "rar")
    }

    /// Normalize one file into a [`Document`].
    pub async fn process(&self, path: &Path) -> Result<Document, DocnormError> {
        self.process_at_depth(path, 0).await
    }

    /// Recursion point shared by top-level files and archive members.
    ///
    /// Boxed because archive extraction calls back into this function for
    /// each member, making the future type recursive.
    pub(crate) fn process_at_depth<'a>(
        &'a self,
        path: &'a Path,
        depth: usize,
    ) -> BoxFuture<'a, Result<Document, DocnormError>> {
        Box::pin(async move {
            // Routing (and the temporary-artifact refusal) happens on the
            // name alone, before the file is ever opened.
            let family = route(path)?;
            check_readable(path)?;
            debug!("processing {} as {family:?} (depth {depth})", path.display());

            let mut builder = Document::builder(path);
            match family {
                FormatFamily::Paged => {
                    extract::paged::extract(path, &mut builder, &self.config, &*self.describer)
                        .await?;
                }
                FormatFamily::Office => {
                    let staging = staging_dir(path)?;
                    let pdf =
                        office::convert_to_pdf(path, staging.path(), &self.config).await?;
                    extract::paged::extract(&pdf, &mut builder, &self.config, &*self.describer)
                        .await?;
                }
                FormatFamily::IWork => {
                    let staging = staging_dir(path)?;
                    let source = path.to_path_buf();
                    let dest = staging.path().to_path_buf();
                    let pdf = tokio::task::spawn_blocking(move || {
                        extract::markup::extract_iwork_preview(&source, &dest)
                    })
                    .await
                    .map_err(|e| DocnormError::Internal(format!("iwork task panicked: {e}")))??;
                    extract::paged::extract(&pdf, &mut builder, &self.config, &*self.describer)
                        .await?;
                }
                FormatFamily::Image => {
                    extract::image::extract(path, &mut builder, &self.config, &*self.describer)
                        .await?;
                }
                FormatFamily::Spreadsheet => {
                    if builder.extension() == ".csv" {
                        extract::sheet::extract_csv(path, &mut builder).await?;
                    } else {
                        extract::sheet::extract_workbook(path, &mut builder).await?;
                    }
                }
                FormatFamily::PlainText => {
                    extract::text::extract(path, &mut builder).await?;
                }
                FormatFamily::Markdown => {
                    extract::markup::extract_markdown(path, &mut builder).await?;
                }
                FormatFamily::Rtf => {
                    extract::markup::extract_rtf(path, &mut builder).await?;
                }
                FormatFamily::Odt => {
                    extract::markup::extract_odt(path, &mut builder).await?;
                }
                FormatFamily::Epub => {
                    extract::markup::extract_epub(path, &mut builder).await?;
                }
                FormatFamily::Archive(kind) => {
                    if depth >= self.config.limits.max_archive_depth {
                        return Err(DocnormError::Extraction {
                            path: path.to_path_buf(),
                            detail: format!(
                                "nested archive exceeds depth limit ({})",
                                self.config.limits.max_archive_depth
                            ),
                        });
                    }
                    if kind == ArchiveKind::Rar && !self.supports_rar() {
                        return Err(DocnormError::CapabilityUnavailable {
                            capability: "rar extraction".into(),
                            hint: "rebuild with the 'rar' feature enabled".into(),
                        });
                    }
                    extract::archive::extract(path, &mut builder, self, kind, depth).await?;
                }
            }
            Ok(builder.finish())
        })
    }
}

fn staging_dir(path: &Path) -> Result<tempfile::TempDir, DocnormError> {
    tempfile::tempdir().map_err(|e| DocnormError::Extraction {
        path: path.to_path_buf(),
        detail: format!("cannot create staging dir: {e}"),
    })
}

/// Verify the file exists and is readable, with typed failures.
fn check_readable(path: &Path) -> Result<(), DocnormError> {
    match std::fs::File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DocnormError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(DocnormError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(DocnormError::Extraction {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}
