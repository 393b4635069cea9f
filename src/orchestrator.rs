//! The generate → validate → retry loop behind `POST /api/generate`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::{DataUrlImage, GenerateRequest, GenerationRecord, GenerationStatus, ImageError};
use crate::prompts::{build_system_prompt, build_user_prompt, TemplateType, UserPrompt};
use crate::store::{GenerationStore, GenerationUpdate, StoreError};
use crate::stylesheet::{css_size_kb, StylesheetGenerator};
use crate::telemetry::{self, MetricKind, Timer};
use crate::tokens::DesignTokens;
use crate::v0::{CompletionApi, CompletionRequest, UpstreamError};
use crate::validation::validate_generated_code;

/// The first attempt plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("A valid prompt is required")]
    InvalidPrompt,
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("V0_API_KEY is not configured")]
    NotConfigured,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Code validation failed: {reason}. Maximum retry attempts exceeded.")]
    ValidationExhausted { reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub record: GenerationRecord,
    pub attempts: u32,
    pub template: TemplateType,
    pub duration_ms: u64,
}

pub struct Orchestrator {
    store: Arc<dyn GenerationStore>,
    api: Option<Arc<dyn CompletionApi>>,
    tokens: Arc<DesignTokens>,
    stylesheet: Arc<dyn StylesheetGenerator>,
}

impl Orchestrator {
    /// `api` is `None` when no key is configured; requests then fail after
    /// input validation.
    pub fn new(
        store: Arc<dyn GenerationStore>,
        api: Option<Arc<dyn CompletionApi>>,
        tokens: Arc<DesignTokens>,
        stylesheet: Arc<dyn StylesheetGenerator>,
    ) -> Self {
        Self {
            store,
            api,
            tokens,
            stylesheet,
        }
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerationOutcome, GenerationError> {
        let timer = Timer::start();
        let result = self.run(request, &timer).await;
        let elapsed = timer.elapsed();
        telemetry::record(MetricKind::GenerationTotal, "generation", elapsed);
        if let Err(e) = &result {
            error!("❌ Generation failed after {}: {}", telemetry::format_duration(elapsed), e);
        }
        result
    }

    async fn run(&self, request: GenerateRequest, timer: &Timer) -> Result<GenerationOutcome, GenerationError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            warn!("⚠️ Invalid prompt received");
            return Err(GenerationError::InvalidPrompt);
        }

        let image = match request.reference_image.as_deref() {
            Some(data_url) => {
                let image = DataUrlImage::parse(data_url).inspect_err(|e| warn!("⚠️ Rejected reference image: {}", e))?;
                info!("🖼️ Image-to-image generation requested ({}KB, {:?})", image.size_kb(), image.format);
                Some(image)
            }
            None => None,
        };
        let has_image = image.is_some();

        let api = self.api.as_ref().ok_or_else(|| {
            error!("❌ V0_API_KEY not configured");
            GenerationError::NotConfigured
        })?;

        let template = request.template.unwrap_or_else(|| TemplateType::detect(prompt));
        info!(
            style = request.style.as_str(),
            template = template.as_str(),
            "🚀 Generation request received ({} chars)",
            prompt.len()
        );

        let record = self.store.create(prompt, request.style).await?;
        let generation_id = record.id;
        info!(%generation_id, "🎯 Generation created");

        let system_prompt = build_system_prompt(&self.tokens, has_image);
        let mut retry_reason: Option<String> = None;
        let mut attempt = 0;

        let code = loop {
            attempt += 1;
            info!(%generation_id, attempt, has_image, "🔄 Generation attempt {}/{}", attempt, MAX_ATTEMPTS);

            let completion = CompletionRequest {
                system_prompt: system_prompt.clone(),
                user_prompt: build_user_prompt(&UserPrompt {
                    prompt,
                    template,
                    style: request.style,
                    retry_reason: retry_reason.as_deref(),
                    reference_image: has_image && attempt == 1,
                }),
                image: image.as_ref().map(|image| image.data_url.clone()),
            };

            let label = format!("model call {generation_id} #{attempt}");
            let code = match telemetry::measure(MetricKind::ModelCall, &label, api.complete(&completion)).await {
                Ok(code) => code,
                Err(e) => {
                    error!(%generation_id, attempt, "❌ Model API call failed: {}", e);
                    self.fail(generation_id, None).await;
                    return Err(e.into());
                }
            };

            let validation_timer = Timer::start();
            let validation = validate_generated_code(&code);
            telemetry::record(MetricKind::Validation, "validation", validation_timer.elapsed());

            match validation.reason {
                None => {
                    info!(%generation_id, attempt, "✅ Code validation passed");
                    break code;
                }
                Some(reason) if attempt >= MAX_ATTEMPTS => {
                    error!(%generation_id, reason = %reason, "❌ Max retry attempts exceeded");
                    // The rejected code is kept for debugging.
                    self.fail(generation_id, Some(code)).await;
                    return Err(GenerationError::ValidationExhausted { reason });
                }
                Some(reason) => {
                    warn!(%generation_id, attempt, reason = %reason, "⚠️ Code validation failed, retrying");
                    retry_reason = Some(reason);
                }
            }
        };

        let css = self.stylesheet_for(generation_id, &code).await;
        let completed = GenerationUpdate {
            code: Some(code),
            css,
            status: Some(GenerationStatus::Completed),
        };
        let record = match self.store.update(generation_id, completed).await {
            Ok(record) => record,
            Err(e) => {
                error!(%generation_id, "❌ Failed to save generated code: {}", e);
                self.fail(generation_id, None).await;
                return Err(e.into());
            }
        };

        let duration_ms = timer.elapsed_ms();
        info!(
            %generation_id,
            attempts = attempt,
            template = template.as_str(),
            code_length = record.code.len(),
            css_length = record.css.as_ref().map_or(0, String::len),
            "🎉 Generation completed in {}",
            timer.human()
        );

        Ok(GenerationOutcome {
            record,
            attempts: attempt,
            template,
            duration_ms,
        })
    }

    /// Stylesheet generation is best-effort; a failure leaves `css` unset.
    async fn stylesheet_for(&self, generation_id: uuid::Uuid, code: &str) -> Option<String> {
        let generator = self.stylesheet.clone();
        let source = code.to_string();
        let task = tokio::task::spawn_blocking(move || generator.generate(&source));
        match telemetry::measure(MetricKind::Stylesheet, "stylesheet", task).await {
            Ok(Ok(css)) if css.is_empty() => None,
            Ok(Ok(css)) => {
                info!(%generation_id, "🎨 CSS generated ({:.2} KB)", css_size_kb(&css));
                Some(css)
            }
            Ok(Err(e)) => {
                error!(%generation_id, "❌ CSS generation failed, continuing without CSS: {}", e);
                None
            }
            Err(e) => {
                error!(%generation_id, "❌ CSS task failed, continuing without CSS: {}", e);
                None
            }
        }
    }

    async fn fail(&self, generation_id: uuid::Uuid, code: Option<String>) {
        let update = GenerationUpdate {
            code,
            css: None,
            status: Some(GenerationStatus::Failed),
        };
        if let Err(e) = self.store.update(generation_id, update).await {
            error!(%generation_id, "❌ Failed to mark generation as failed: {}", e);
        }
    }
}
