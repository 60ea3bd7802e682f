//! LLM provider abstraction
//!
//! Provides a common interface for interacting with LLM providers.

mod anthropic;
mod error;
mod models;
mod registry;
mod types;

pub use anthropic::AnthropicService;
pub use error::{LlmError, LlmErrorKind};
pub use models::{all_models, ModelDef};
pub use registry::{LlmConfig, ModelRegistry};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Wraps a provider so every call is traced under an `llm` span carrying
/// the model and the size of the conversation sent
pub struct TracedService {
    inner: Arc<dyn LlmService>,
}

impl TracedService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        Self { inner }
    }
}

fn record_outcome(result: &Result<LlmResponse, LlmError>, elapsed: Duration) {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    match result {
        Ok(response) if response.end_turn => tracing::info!(
            elapsed_ms,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "LLM call finished"
        ),
        // Usually the token budget ran out mid-reply
        Ok(response) => tracing::warn!(
            elapsed_ms,
            output_tokens = response.usage.output_tokens,
            "LLM call stopped early"
        ),
        Err(e) => tracing::error!(
            elapsed_ms,
            kind = e.kind.as_str(),
            error = %e.message,
            "LLM call failed"
        ),
    }
}

#[async_trait]
impl LlmService for TracedService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let span = tracing::info_span!(
            "llm",
            model = %self.inner.model_id(),
            messages = request.messages.len(),
            system_blocks = request.system.len(),
        );
        async {
            let start = Instant::now();
            let result = self.inner.complete(request).await;
            record_outcome(&result, start.elapsed());
            result
        }
        .instrument(span)
        .await
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
