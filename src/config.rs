//! Configuration for the normalization engine.
//!
//! All behaviour is controlled through [`EngineConfig`], built via its
//! [`EngineConfigBuilder`]. Working directories, policy ceilings, and the
//! description-service wiring all live here and are passed into
//! [`crate::engine::Engine::new`] explicitly — nothing is initialized as an
//! import-time side effect, so two engines with different configs can
//! coexist in one process.
//!
//! Constructed through the builder: callers set the knobs they care about
//! and inherit documented defaults for everything else, and `build()` is
//! the single place constraints are checked.

use crate::describe::DescriptionService;
use crate::error::DocnormError;
use crate::limits::Limits;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a normalization [`Engine`](crate::engine::Engine).
///
/// # Example
/// ```rust
/// use docnorm::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .images_dir("out/images")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    /// Resource ceilings consulted before every persist/describe/recurse.
    pub limits: Limits,

    /// Directory where extracted and rasterized images are persisted.
    /// Created at engine construction. Default: `"images"`.
    ///
    /// Names written here are derived from the source filename plus a
    /// page/member qualifier, so concurrent documents with distinct sources
    /// never clobber each other.
    pub images_dir: PathBuf,

    /// Pre-constructed description service. Takes precedence over
    /// `provider_name`. The seam used by tests and by callers needing
    /// custom middleware.
    pub describer: Option<Arc<dyn DescriptionService>>,

    /// Vision provider name (e.g. "openai", "anthropic", "ollama").
    /// When `None` along with `describer`, the engine auto-detects from
    /// API-key environment variables and degrades to a placeholder service
    /// when none is configured.
    pub provider_name: Option<String>,

    /// Vision model identifier, e.g. "gpt-4.1-nano". `None` uses the
    /// provider default.
    pub model: Option<String>,

    /// Sampling temperature for description calls. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to what is actually in the
    /// image, which is what an inventory pipeline wants.
    pub temperature: f32,

    /// Maximum tokens per description. Default: 1024.
    pub max_tokens: usize,

    /// Retry attempts on a transient description failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-description-call timeout in seconds. A timeout degrades that one
    /// call to a placeholder, never the document. Default: 60.
    pub api_timeout_secs: u64,

    /// Timeout for one office-to-PDF conversion in seconds. Default: 120.
    pub convert_timeout_secs: u64,

    /// Explicit path to the LibreOffice `soffice` executable. When `None`,
    /// SOFFICE_PATH and then PATH are searched at conversion time.
    pub soffice_path: Option<PathBuf>,

    /// Override for the built-in image description prompt.
    pub description_prompt: Option<String>,

    /// Concurrent documents in [`crate::batch::process_folder`]. Each
    /// document is exclusively owned by its worker. Default: 4.
    pub batch_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            images_dir: PathBuf::from("images"),
            describer: None,
            provider_name: None,
            model: None,
            temperature: 0.1,
            max_tokens: 1024,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            convert_timeout_secs: 120,
            soffice_path: None,
            description_prompt: None,
            batch_concurrency: 4,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("limits", &self.limits)
            .field("images_dir", &self.images_dir)
            .field("describer", &self.describer.as_ref().map(|_| "<dyn DescriptionService>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("convert_timeout_secs", &self.convert_timeout_secs)
            .field("soffice_path", &self.soffice_path)
            .field("batch_concurrency", &self.batch_concurrency)
            .finish()
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.images_dir = dir.into();
        self
    }

    pub fn describer(mut self, service: Arc<dyn DescriptionService>) -> Self {
        self.config.describer = Some(service);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout_secs = secs.max(1);
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn description_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.description_prompt = Some(prompt.into());
        self
    }

    pub fn batch_concurrency(mut self, n: usize) -> Self {
        self.config.batch_concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, DocnormError> {
        let c = &self.config;
        if c.limits.max_image_dim == 0 {
            return Err(DocnormError::InvalidConfig(
                "max_image_dim must be ≥ 1".into(),
            ));
        }
        if c.images_dir.as_os_str().is_empty() {
            return Err(DocnormError::InvalidConfig(
                "images_dir must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_validate() {
        let config = EngineConfig::builder().build().unwrap();
        assert_eq!(config.images_dir, PathBuf::from("images"));
        assert_eq!(config.api_timeout_secs, 60);
        assert_eq!(config.limits.max_vision_calls_per_page, 50);
    }

    #[test]
    fn empty_images_dir_rejected() {
        let err = EngineConfig::builder().images_dir("").build().unwrap_err();
        assert!(matches!(err, DocnormError::InvalidConfig(_)));
    }

    #[test]
    fn temperature_is_clamped() {
        let config = EngineConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(config.temperature, 2.0);
    }

    #[test]
    fn zero_image_dim_rejected() {
        let limits = Limits {
            max_image_dim: 0,
            ..Limits::default()
        };
        let err = EngineConfig::builder().limits(limits).build().unwrap_err();
        assert!(matches!(err, DocnormError::InvalidConfig(_)));
    }
}
