//! Configuration for the review pipeline.
//!
//! Every tunable lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Stores and the analyzer are passed to the
//! pipeline separately; this struct only holds values.

use crate::error::ReviewError;
use crate::progress::Observer;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default length of the longer preview edge, in pixels.
pub const DEFAULT_MAX_RENDERED_PIXELS: u32 = 2000;

/// Default key namespace for Document Records.
pub const DEFAULT_RECORD_PREFIX: &str = "resume:";

/// Configuration for a [`crate::ReviewPipeline`].
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use resumind::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_rendered_pixels(1600)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.record_prefix, "resume:");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Length of the longer preview edge in pixels. Range: 256–4096. Default: 2000.
    ///
    /// A letter-size page at 2000 px tall is roughly 240 DPI: crisp enough
    /// for the analysis model to read 9 pt type.
    pub max_rendered_pixels: u32,

    /// Explicit pdfium shared library (file or directory). When `None`,
    /// `PDFIUM_LIB_PATH` and then the system library are tried.
    pub pdfium_library: Option<PathBuf>,

    /// Key prefix under which Document Records are stored. Default: `"resume:"`.
    pub record_prefix: String,

    /// Blob directory cleared by [`crate::ReviewPipeline::wipe`]. Default: the root.
    pub blob_dir: String,

    /// LLM model identifier, e.g. "gpt-4.1-mini", "claude-sonnet-4-20250514".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate for one review. Default: 4096.
    ///
    /// A full five-category review with tips runs to about 1 500 tokens;
    /// too low a budget truncates the JSON and fails schema validation.
    pub max_tokens: usize,

    /// Timeout for one analysis call, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses the built-in reviewer prompt.
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-state events for every submission.
    pub observer: Option<Observer>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: DEFAULT_MAX_RENDERED_PIXELS,
            pdfium_library: None,
            record_prefix: DEFAULT_RECORD_PREFIX.to_string(),
            blob_dir: String::new(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            api_timeout_secs: 120,
            system_prompt: None,
            download_timeout_secs: 120,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library", &self.pdfium_library)
            .field("record_prefix", &self.record_prefix)
            .field("blob_dir", &self.blob_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn SubmissionObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn record_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.record_prefix = prefix.into();
        self
    }

    pub fn blob_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.blob_dir = dir.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
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

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn observer(mut self, observer: Observer) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ReviewError> {
        let c = &self.config;
        if !(256..=4096).contains(&c.max_rendered_pixels) {
            return Err(ReviewError::InvalidConfig(format!(
                "max_rendered_pixels must be 256–4096, got {}",
                c.max_rendered_pixels
            )));
        }
        if c.record_prefix.is_empty() {
            return Err(ReviewError::InvalidConfig(
                "record_prefix must not be empty; it separates records from other keys".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ReviewError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(ReviewError::InvalidConfig("timeouts must be ≥ 1 second".into()));
        }
        Ok(self.config)
    }
}
