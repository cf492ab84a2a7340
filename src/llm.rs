//! Model client abstraction
//!
//! The orchestration core only sees [`LlmService::stream`]; transport and
//! wire details stay behind it.

mod error;
mod openai;
mod types;

pub use error::LlmError;
pub use openai::OpenAiService;
pub use types::*;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Incremental response. Ends after a [`StreamPart::Finish`] or an error.
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamPart, LlmError>> + Send>>;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[async_trait]
pub trait LlmService: Send + Sync {
    /// Open a streaming completion. Failures before the first part are
    /// returned here; later ones arrive as stream items.
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError>;

    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        (**self).stream(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Model configuration from the environment
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
            model: std::env::var("MENUBOT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    /// Build the configured service, wrapped for logging.
    ///
    /// Without an API key every request fails with an auth error, so the
    /// server still starts and turns resolve to an error rendering.
    pub fn build_service(&self) -> Result<Arc<dyn LlmService>, LlmError> {
        let inner: Arc<dyn LlmService> = match &self.api_key {
            Some(key) => Arc::new(OpenAiService::new(
                key.clone(),
                self.model.clone(),
                self.base_url.as_deref(),
            )?),
            None => {
                tracing::warn!("OPENAI_API_KEY not set, model requests will fail");
                Arc::new(UnconfiguredService {
                    model_id: self.model.clone(),
                })
            }
        };
        Ok(Arc::new(LoggingService::new(inner)))
    }
}

struct UnconfiguredService {
    model_id: String,
}

#[async_trait]
impl LlmService for UnconfiguredService {
    async fn stream(&self, _request: &LlmRequest) -> Result<LlmStream, LlmError> {
        Err(LlmError::auth("No API key configured"))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Logging wrapper for model services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let start = Instant::now();
        let model = self.model_id.clone();
        let stream = match self.inner.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %model,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
                return Err(e);
            }
        };

        let logged = stream.inspect(move |part| match part {
            Ok(StreamPart::Finish { usage }) => tracing::info!(
                model = %model,
                duration_ms = %start.elapsed().as_millis(),
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                usage_reported = !usage.is_zero(),
                "LLM request completed"
            ),
            Err(e) => tracing::error!(
                model = %model,
                duration_ms = %start.elapsed().as_millis(),
                error = %e.message,
                "LLM stream failed"
            ),
            Ok(_) => {}
        });
        Ok(Box::pin(logged))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
