//! # docnorm
//!
//! Normalize heterogeneous files — PDFs, office documents, images,
//! spreadsheets, e-books, archives — into one [`Document`] record: text in
//! reading order, persisted image references, serialized tables, and
//! source metadata.
//!
//! ## Pipeline
//!
//! 1. **Route** the file by name: refuse office lock artifacts, map the
//!    extension to a format family ([`router`])
//! 2. **Convert** editable office formats to PDF via LibreOffice
//!    ([`office`]); iWork containers contribute their preview PDF
//! 3. **Extract** with the family's strategy ([`extract`]): pdfium page
//!    walks, image normalization, calamine workbooks, markup stripping,
//!    archive recursion
//! 4. **Describe** document images through a vision provider
//!    ([`describe`]), bounded by a per-page call quota and degraded to
//!    placeholders on failure
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use docnorm::{Engine, EngineConfig};
//!
//! # async fn run() -> Result<(), docnorm::DocnormError> {
//! let engine = Engine::new(EngineConfig::builder().build()?)?;
//! let doc = engine.process(std::path::Path::new("report.pdf")).await?;
//! println!("{}", doc.text_content);
//! # Ok(())
//! # }
//! ```
//!
//! Without a vision API key the pipeline still runs end to end; image
//! descriptions degrade to a fixed placeholder.

pub mod batch;
pub mod config;
pub mod describe;
pub mod document;
pub mod engine;
pub mod error;
pub mod extract;
pub mod limits;
pub mod office;
pub mod prompts;
pub mod router;

pub use batch::{process_folder, BatchOutcome};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use describe::{DescriptionService, PlaceholderDescriber, VisionDescriber};
pub use document::{Document, DocumentBuilder};
pub use engine::Engine;
pub use error::{DescribeError, DocnormError};
pub use limits::{Limits, PageQuota};
pub use prompts::{FAILURE_PLACEHOLDER, QUOTA_PLACEHOLDER};
pub use router::{ArchiveKind, FormatFamily};
