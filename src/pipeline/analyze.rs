//! Analysis endpoint: the [`Analyzer`] contract and its vision-LLM binding.
//!
//! The orchestrator only knows `complete(document_ref, instructions)`. What
//! "the document" means to a model is this module's business: the
//! [`VisionAnalyzer`] reads the stored document back, renders its first page,
//! and sends that image with the instructions through `edgequake-llm`.
//!
//! There is no retry here. A failed or timed-out call is returned to the
//! orchestrator, which fails the run; re-submitting is the caller's choice.

use crate::config::PipelineConfig;
use crate::error::{AnalysisError, ReviewError};
use crate::pipeline::encode::image_attachment;
use crate::pipeline::render::{rasterize, PdfiumRasterizer, Rasterizer};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::store::BlobStore;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Model used when a provider is chosen but no model is named.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Raw answer from the analysis endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Completion {
    /// A completion with only text, as scripted analyzers return.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// The external analysis endpoint.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyse the stored document at `document_ref` following `instructions`.
    async fn complete(
        &self,
        document_ref: &str,
        instructions: &str,
    ) -> Result<Completion, AnalysisError>;
}

/// [`Analyzer`] that shows the first page of the document to a vision model.
pub struct VisionAnalyzer {
    provider: Arc<dyn LLMProvider>,
    blobs: Arc<dyn BlobStore>,
    rasterizer: Arc<dyn Rasterizer>,
    system_prompt: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl VisionAnalyzer {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        blobs: Arc<dyn BlobStore>,
        rasterizer: Arc<dyn Rasterizer>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            provider,
            blobs,
            rasterizer,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider from `config` and render with pdfium.
    pub fn from_config(
        blobs: Arc<dyn BlobStore>,
        config: &PipelineConfig,
    ) -> Result<Self, ReviewError> {
        let provider = resolve_provider(config)?;
        info!(
            "Analysis provider: {} / {}",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model.as_deref().unwrap_or("default")
        );
        let rasterizer: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::from_config(config));
        Ok(Self::new(provider, blobs, rasterizer, config))
    }

    async fn page_image(&self, document_ref: &str) -> Result<ImageData, AnalysisError> {
        let bytes = self
            .blobs
            .read(document_ref)
            .await
            .map_err(|e| AnalysisError::Document {
                path: document_ref.to_string(),
                detail: e.to_string(),
            })?;
        let raster = rasterize(Arc::clone(&self.rasterizer), bytes, document_ref.to_string())
            .await
            .map_err(|e| AnalysisError::Document {
                path: document_ref.to_string(),
                detail: e.to_string(),
            })?;
        Ok(image_attachment(&raster.png))
    }
}

#[async_trait]
impl Analyzer for VisionAnalyzer {
    async fn complete(
        &self,
        document_ref: &str,
        instructions: &str,
    ) -> Result<Completion, AnalysisError> {
        let start = Instant::now();
        let image = self.page_image(document_ref).await?;
        let messages = build_messages(&self.system_prompt, instructions, image);

        let response = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| {
            warn!("Analysis of {} timed out", document_ref);
            AnalysisError::Timeout {
                secs: self.timeout.as_secs(),
            }
        })?
        .map_err(|e| AnalysisError::Provider(e.to_string()))?;

        debug!(
            "Analysis of {}: {} input tokens, {} output tokens, {:?}",
            document_ref,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        // Blank text is still an answer; the feedback parser rejects it.
        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Message layout: system prompt, then one user turn carrying the
/// instructions and the page image.
fn build_messages(system_prompt: &str, instructions: &str, image: ImageData) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(instructions, vec![image]),
    ]
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ReviewError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ReviewError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`]).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. OpenAI when `OPENAI_API_KEY` is set.
/// 5. Whatever [`ProviderFactory::from_env`] detects.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, ReviewError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ReviewError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
