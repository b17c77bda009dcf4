//! Paged-document extraction (PDF) via pdfium.
//!
//! The extraction runs in two phases. A blocking phase walks the whole
//! document inside `spawn_blocking` (pdfium bindings are not `Send`, so no
//! pdfium handle may cross an await point) and collects each page as either
//! a full-page raster or an ordered list of text/image spans. The async
//! phase then persists images and spends description calls under the
//! per-page quota.
//!
//! Page classification follows what scanners and drawing tools actually
//! produce: a page containing vector path objects is treated as a graphics
//! page and rasterized whole, with a single quota-exempt description. All
//! other pages are walked span by span in reading order.
//!
//! A failing page is contained to that page: the text gets a marker and the
//! remaining pages still process.

use crate::config::EngineConfig;
use crate::describe::DescriptionService;
use crate::document::DocumentBuilder;
use crate::error::DocnormError;
use crate::limits::{Limits, PageQuota};
use crate::prompts::QUOTA_PLACEHOLDER;
use ::image::{imageops::FilterType, DynamicImage};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Separator appended after every page, failed ones included.
const PAGE_SEPARATOR: &str = "\n---\n";

/// An embedded image plus the dimensions it had before the downscale cap.
///
/// The area filter runs on the source dimensions: an extreme-aspect image
/// capped to a sliver must not slip under the threshold it originally
/// cleared.
pub(crate) struct ImageSpan {
    pub image: DynamicImage,
    pub source_dims: (u32, u32),
}

/// One span of a text page, in reading order.
pub(crate) enum Span {
    Text(String),
    Image(ImageSpan),
}

pub(crate) enum PageContent {
    /// Vector-graphics page rendered whole.
    Graphics(DynamicImage),
    /// Ordinary page as ordered text/image spans.
    Spans(Vec<Span>),
}

pub(crate) struct PageUnit {
    /// 1-based page number.
    pub number: usize,
    pub content: PageContent,
}

struct PdfLoad {
    metadata: Vec<(String, String)>,
    /// Per-page outcome; a failed page carries its error text.
    pages: Vec<Result<PageUnit, String>>,
}

fn bind_pdfium() -> Result<Pdfium, DocnormError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
                .or_else(|_| Pdfium::bind_to_system_library())
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DocnormError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

/// Document-info tags surfaced into `Document::metadata`.
const METADATA_TAGS: &[(PdfDocumentMetadataTagType, &str)] = &[
    (PdfDocumentMetadataTagType::Title, "title"),
    (PdfDocumentMetadataTagType::Author, "author"),
    (PdfDocumentMetadataTagType::Subject, "subject"),
    (PdfDocumentMetadataTagType::Keywords, "keywords"),
    (PdfDocumentMetadataTagType::Creator, "creator"),
    (PdfDocumentMetadataTagType::Producer, "producer"),
    (PdfDocumentMetadataTagType::CreationDate, "creationDate"),
    (PdfDocumentMetadataTagType::ModificationDate, "modDate"),
];

/// Cap an image at the configured maximum dimension.
fn bounded(img: DynamicImage, limits: &Limits) -> DynamicImage {
    match limits.downscale_dimensions(img.width(), img.height()) {
        Some((w, h)) => img.resize_exact(w, h, FilterType::Lanczos3),
        None => img,
    }
}

fn load_pdf(path: &Path, limits: &Limits) -> Result<PdfLoad, DocnormError> {
    let pdfium = bind_pdfium()?;
    let document =
        pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| DocnormError::CorruptPdf {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

    let document_info = document.metadata();
    let metadata = METADATA_TAGS
        .iter()
        .filter_map(|&(tag, key)| {
            document_info
                .get(tag)
                .map(|t| (key.to_string(), t.value().to_string()))
        })
        .collect();

    let render_config = PdfRenderConfig::new()
        .set_target_width(limits.max_image_dim as i32)
        .set_maximum_height(limits.max_image_dim as i32);

    let page_count = document.pages().len();
    debug!("{}: {page_count} pages", path.display());

    let mut pages = Vec::with_capacity(page_count as usize);
    for (index, page) in document.pages().iter().enumerate() {
        let number = index + 1;
        pages.push(load_page(&document, &page, number, &render_config, limits));
    }

    Ok(PdfLoad { metadata, pages })
}

fn load_page(
    document: &PdfDocument,
    page: &PdfPage,
    number: usize,
    render_config: &PdfRenderConfig,
    limits: &Limits,
) -> Result<PageUnit, String> {
    let has_drawings = page
        .objects()
        .iter()
        .any(|object| matches!(object, PdfPageObject::Path(_)));

    if has_drawings {
        let bitmap = page
            .render_with_config(render_config)
            .map_err(|e| format!("page {number} render failed: {e}"))?;
        return Ok(PageUnit {
            number,
            content: PageContent::Graphics(bounded(bitmap.as_image(), limits)),
        });
    }

    let mut spans = Vec::new();
    for object in page.objects().iter() {
        // Bind by reference: the object wrapper frees pdfium state on drop.
        match object {
            PdfPageObject::Text(ref text) => {
                let content = text.text();
                if !content.is_empty() {
                    spans.push(Span::Text(content));
                }
            }
            PdfPageObject::Image(ref image) => match image.get_processed_image(document) {
                Ok(img) => {
                    let source_dims = (img.width(), img.height());
                    spans.push(Span::Image(ImageSpan {
                        image: bounded(img, limits),
                        source_dims,
                    }));
                }
                // A broken embedded image costs that image, not the page.
                Err(e) => warn!("page {number}: embedded image unreadable: {e}"),
            },
            _ => {}
        }
    }
    Ok(PageUnit {
        number,
        content: PageContent::Spans(spans),
    })
}

/// Persist and describe the collected pages in order.
pub(crate) async fn assemble_pages(
    pages: Vec<Result<PageUnit, String>>,
    builder: &mut DocumentBuilder,
    config: &EngineConfig,
    describer: &dyn DescriptionService,
) {
    let stem = builder.stem();
    for outcome in pages {
        let unit = match outcome {
            Ok(unit) => unit,
            Err(detail) => {
                warn!("{detail}");
                builder.push_text("(page could not be processed)\n");
                builder.push_text(PAGE_SEPARATOR);
                continue;
            }
        };
        let n = unit.number;
        builder.push_text(&format!("========[Page {n}]========\n"));

        match unit.content {
            PageContent::Graphics(img) => {
                // One quota-exempt description for the whole rendered page.
                match super::persist_image(&img, &config.images_dir, &format!("{stem}_page{n}.png"))
                {
                    Ok(saved) => {
                        builder.add_image(saved);
                        let description = super::describe_or_placeholder(
                            describer,
                            &img,
                            &format!("page {n} raster"),
                        )
                        .await;
                        builder.push_text(&description);
                        builder.push_text("\n");
                    }
                    Err(e) => {
                        warn!("page {n}: {e}");
                        builder.push_text("(page image could not be persisted)\n");
                    }
                }
            }
            PageContent::Spans(spans) => {
                let mut quota = PageQuota::new(config.limits.max_vision_calls_per_page);
                let mut image_counter = 0usize;
                for span in spans {
                    match span {
                        Span::Text(text) => {
                            builder.push_text(&text);
                            builder.push_text("\n");
                        }
                        Span::Image(span) => {
                            let (sw, sh) = span.source_dims;
                            if !config.limits.worth_describing(sw, sh) {
                                debug!("page {n}: skipping {sw}x{sh} decorative image");
                                continue;
                            }
                            image_counter += 1;
                            let name = format!("{stem}_p{n}_img{image_counter}.png");
                            match super::persist_image(&span.image, &config.images_dir, &name) {
                                Ok(saved) => builder.add_image(saved),
                                Err(e) => {
                                    warn!("page {n}: {e}");
                                    continue;
                                }
                            }
                            let description = if quota.try_acquire() {
                                super::describe_or_placeholder(
                                    describer,
                                    &span.image,
                                    &format!("page {n} image {image_counter}"),
                                )
                                .await
                            } else {
                                QUOTA_PLACEHOLDER.to_string()
                            };
                            builder.push_text(&format!("[Image {image_counter}: {description}]\n"));
                        }
                    }
                }
                if quota.used() > 0 {
                    debug!("page {n}: {} description calls", quota.used());
                }
            }
        }
        builder.push_text(PAGE_SEPARATOR);
    }
}

/// Extract a paged document end to end.
pub async fn extract(
    path: &Path,
    builder: &mut DocumentBuilder,
    config: &EngineConfig,
    describer: &dyn DescriptionService,
) -> Result<(), DocnormError> {
    let p = path.to_path_buf();
    let limits = config.limits;
    let load = tokio::task::spawn_blocking(move || load_pdf(&p, &limits))
        .await
        .map_err(|e| DocnormError::Internal(format!("pdf task panicked: {e}")))??;

    for (key, value) in load.metadata {
        if !value.is_empty() {
            builder.set_metadata(key, value);
        }
    }
    info!("{}: {} pages collected", path.display(), load.pages.len());
    assemble_pages(load.pages, builder, config, describer).await;
    Ok(())
}
