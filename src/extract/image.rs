//! Standalone raster images: orientation fix, downscale, one description.
//!
//! The pixel pipeline runs off the async thread. EXIF orientation is applied
//! before any geometry decision so the recorded dimensions match what a
//! viewer sees, and the stored Orientation tag is then reset to 1. TIFFs are
//! re-encoded as JPEG; every other format keeps its container.

use crate::config::EngineConfig;
use crate::describe::DescriptionService;
use crate::document::DocumentBuilder;
use crate::error::DocnormError;
use crate::limits::Limits;
use ::image::metadata::Orientation;
use ::image::{imageops::FilterType, DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use super::{describe_or_placeholder, persist_image};

#[derive(Debug)]
struct LoadedImage {
    img: DynamicImage,
    out_ext: &'static str,
    exif: Vec<(String, String)>,
    original_dims: (u32, u32),
}

fn read_exif_fields(path: &Path) -> Vec<(String, String)> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(data) => data
            .fields()
            .map(|f| {
                let value = if f.tag == exif::Tag::Orientation {
                    // Orientation has been baked into the pixels.
                    "1".to_string()
                } else {
                    f.display_value().with_unit(&data).to_string()
                };
                (f.tag.to_string(), value)
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn load_and_normalize(
    path: &Path,
    byte_size: u64,
    limits: &Limits,
) -> Result<LoadedImage, DocnormError> {
    let unreadable = |detail: String| DocnormError::UnreadableImage {
        path: path.to_path_buf(),
        detail,
    };

    let reader = ImageReader::open(path)
        .map_err(|e| unreadable(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| unreadable(e.to_string()))?;
    let format = reader.format();
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| unreadable(e.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img =
        DynamicImage::from_decoder(decoder).map_err(|e| unreadable(e.to_string()))?;
    img.apply_orientation(orientation);

    let original_dims = (img.width(), img.height());
    if let Some((w, h)) = limits.downscale_dimensions(img.width(), img.height()) {
        debug!(
            "downscaling {} from {}x{} to {w}x{h}",
            path.display(),
            img.width(),
            img.height()
        );
        img = img.resize_exact(w, h, FilterType::Lanczos3);
    } else if byte_size > limits.max_image_bytes {
        // Dimensions fit but the encoding is oversized; persisting below
        // re-encodes without scaling.
        debug!(
            "{} is {byte_size} bytes, re-encoding without resize",
            path.display()
        );
    }

    let out_ext = match format {
        Some(ImageFormat::Tiff) => {
            // JPEG cannot carry an alpha channel.
            img = DynamicImage::ImageRgb8(img.to_rgb8());
            "jpg"
        }
        // WebP decodes but has no encoder.
        Some(ImageFormat::WebP) | None => "png",
        Some(f) => f.extensions_str().first().copied().unwrap_or("png"),
    };

    let exif = read_exif_fields(path);
    Ok(LoadedImage {
        img,
        out_ext,
        exif,
        original_dims,
    })
}

/// Extract a standalone image: normalize, persist, describe once.
pub async fn extract(
    path: &Path,
    builder: &mut DocumentBuilder,
    config: &EngineConfig,
    describer: &dyn DescriptionService,
) -> Result<(), DocnormError> {
    let p = path.to_path_buf();
    let byte_size = builder.byte_size();
    let limits = config.limits;
    let loaded = tokio::task::spawn_blocking(move || load_and_normalize(&p, byte_size, &limits))
        .await
        .map_err(|e| DocnormError::Internal(format!("image task panicked: {e}")))??;

    for (tag, value) in &loaded.exif {
        builder.set_metadata(tag, value.clone());
    }
    builder.set_metadata(
        "original_dimensions",
        format!("{}x{}", loaded.original_dims.0, loaded.original_dims.1),
    );

    let name = format!("{}.{}", builder.stem(), loaded.out_ext);
    let saved = persist_image(&loaded.img, &config.images_dir, &name)?;
    builder.add_image(saved);

    let description =
        describe_or_placeholder(describer, &loaded.img, &path.display().to_string()).await;
    builder.push_text(&description);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn corrupt_bytes_are_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let err = load_and_normalize(&path, 20, &Limits::default()).unwrap_err();
        assert!(matches!(err, DocnormError::UnreadableImage { .. }));
    }

    #[test]
    fn oversized_image_is_downscaled_to_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        DynamicImage::new_rgb8(6000, 4000).save(&path).unwrap();

        let limits = Limits::default();
        let loaded = load_and_normalize(&path, 1024, &limits).unwrap();
        assert_eq!((loaded.img.width(), loaded.img.height()), (3000, 2000));
        assert_eq!(loaded.original_dims, (6000, 4000));
    }

    #[test]
    fn small_image_keeps_its_size_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        DynamicImage::new_rgb8(320, 240).save(&path).unwrap();

        let loaded = load_and_normalize(&path, 1024, &Limits::default()).unwrap();
        assert_eq!((loaded.img.width(), loaded.img.height()), (320, 240));
        assert_eq!(loaded.out_ext, "png");
    }

    #[test]
    fn tiff_is_reencoded_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.tiff");
        DynamicImage::new_rgba8(300, 300).save(&path).unwrap();

        let loaded = load_and_normalize(&path, 1024, &Limits::default()).unwrap();
        assert_eq!(loaded.out_ext, "jpg");
        assert!(matches!(loaded.img, DynamicImage::ImageRgb8(_)));
    }

    #[tokio::test]
    async fn extract_persists_and_describes_once() {
        use crate::error::DescribeError;
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicU32, Ordering};

        struct Counting(AtomicU32);
        #[async_trait]
        impl DescriptionService for Counting {
            async fn describe(&self, _image: &DynamicImage) -> Result<String, DescribeError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok("a test pattern".to_string())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        DynamicImage::new_rgb8(300, 200).save(&path).unwrap();

        let config = EngineConfig::builder()
            .images_dir(dir.path().join("images"))
            .build()
            .unwrap();
        std::fs::create_dir_all(&config.images_dir).unwrap();

        let service = Counting(AtomicU32::new(0));
        let mut builder = Document::builder(&path);
        extract(&path, &mut builder, &config, &service).await.unwrap();
        let doc = builder.finish();

        assert_eq!(service.0.load(Ordering::SeqCst), 1);
        assert_eq!(doc.text_content, "a test pattern");
        assert_eq!(doc.images.len(), 1);
        assert!(doc.images[0].exists());
        assert_eq!(doc.metadata.get("original_dimensions").unwrap(), "300x200");
    }
}
