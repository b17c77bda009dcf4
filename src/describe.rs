//! The "describe this image" capability.
//!
//! [`DescriptionService`] is the trait seam between extractors and the
//! vision provider, so extractors can be exercised with a stub and the
//! provider can be swapped without touching quota or error-containment
//! logic. Two implementations ship:
//!
//! * [`VisionDescriber`] — wraps an `edgequake-llm` provider: encodes the
//!   image as a base64 PNG, sends one vision chat message, enforces a
//!   per-call timeout, and retries transient failures with exponential
//!   backoff (500 ms → 1 s → 2 s by default).
//! * [`PlaceholderDescriber`] — returns a fixed placeholder; used when no
//!   provider is configured and in tests.
//!
//! ## Why PNG?
//! Lossless encoding preserves text crispness inside document images;
//! JPEG artifacts on small print measurably degrade what the model can
//! transcribe.

use crate::config::EngineConfig;
use crate::error::DescribeError;
use crate::prompts::{DEFAULT_DESCRIPTION_PROMPT, FAILURE_PLACEHOLDER};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Produces a natural-language description of one document image.
///
/// Implementations must be cheap to share (`Arc`) and safe to call
/// sequentially from concurrent documents; the per-page call quota is the
/// caller's responsibility, not the service's.
#[async_trait]
pub trait DescriptionService: Send + Sync {
    /// Describe an already orientation-corrected, size-bounded image.
    async fn describe(&self, image: &DynamicImage) -> Result<String, DescribeError>;
}

/// Encode an image as a base64 PNG ready for a vision API request body.
pub(crate) fn encode_image(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// [`DescriptionService`] backed by a vision LLM provider.
pub struct VisionDescriber {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: u64,
}

impl VisionDescriber {
    /// Wrap a provider with the call policy from `config`.
    #[must_use]
    pub fn new(provider: Arc<dyn LLMProvider>, config: &EngineConfig) -> Self {
        Self {
            provider,
            prompt: config
                .description_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_DESCRIPTION_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }
}

#[async_trait]
impl DescriptionService for VisionDescriber {
    async fn describe(&self, image: &DynamicImage) -> Result<String, DescribeError> {
        let image_data = encode_image(image).map_err(|e| DescribeError::Service {
            retries: 0,
            detail: format!("image encoding failed: {e}"),
        })?;

        let messages = vec![
            ChatMessage::system(&self.prompt),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let mut last_err: Option<String> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "description retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.provider.chat(&messages, Some(&options));
            match timeout(Duration::from_secs(self.timeout_secs), call).await {
                Err(_) => {
                    // One timed-out call burns one attempt but not the page.
                    return Err(DescribeError::Timeout {
                        secs: self.timeout_secs,
                    });
                }
                Ok(Ok(response)) => {
                    debug!(
                        "description ok: {} in / {} out tokens",
                        response.prompt_tokens, response.completion_tokens
                    );
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    let msg = format!("{e}");
                    warn!("description attempt {} failed — {}", attempt + 1, msg);
                    last_err = Some(msg);
                }
            }
        }

        Err(DescribeError::Service {
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

/// No-op service used when no vision provider is configured.
///
/// Keeps text-only pipelines working without an API key; every image
/// "description" is the fixed unavailable placeholder.
#[derive(Debug, Default)]
pub struct PlaceholderDescriber;

#[async_trait]
impl DescriptionService for PlaceholderDescriber {
    async fn describe(&self, _image: &DynamicImage) -> Result<String, DescribeError> {
        Ok(FAILURE_PLACEHOLDER.to_string())
    }
}

/// Resolve the description service, from most-specific to least-specific.
///
/// 1. **Pre-built service** (`config.describer`) — used as-is. The seam for
///    tests and custom middleware.
/// 2. **Named provider** (`config.provider_name` + optional model) — the
///    factory reads the matching API key from the environment.
/// 3. **Auto-detection** (`ProviderFactory::from_env`) — first provider
///    whose API key is present.
/// 4. **Placeholder** — no provider anywhere; descriptions degrade to the
///    fixed placeholder and a warning is logged once here.
pub fn resolve_describer(config: &EngineConfig) -> Arc<dyn DescriptionService> {
    if let Some(ref service) = config.describer {
        return Arc::clone(service);
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        match ProviderFactory::create_llm_provider(name, model) {
            Ok(provider) => return Arc::new(VisionDescriber::new(provider, config)),
            Err(e) => {
                warn!(
                    "provider '{}' not usable ({}); image descriptions will be placeholders",
                    name, e
                );
                return Arc::new(PlaceholderDescriber);
            }
        }
    }

    match ProviderFactory::from_env() {
        Ok((provider, _embedding)) => Arc::new(VisionDescriber::new(provider, config)),
        Err(_) => {
            warn!("no vision provider configured; image descriptions will be placeholders");
            Arc::new(PlaceholderDescriber)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_produces_valid_base64_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 128, 255, 255])));
        let data = encode_image(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[tokio::test]
    async fn placeholder_describer_never_fails() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let out = PlaceholderDescriber.describe(&img).await.unwrap();
        assert_eq!(out, FAILURE_PLACEHOLDER);
    }
}
