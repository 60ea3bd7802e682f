//! Trait abstractions for runtime I/O
//!
//! The dialog policy only ever needs two things from a language model: a
//! bare label for a prompt, and a reply given an instruction and the
//! conversation so far. Keeping that surface narrow lets the executor run
//! against deterministic mocks.

use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService, ModelRegistry, SystemContent};
use crate::state_machine::{Role, Turn};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Text-generation capability used by the dialog policy
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Answer a single classification prompt
    async fn classify(&self, prompt: &str) -> Result<String, LlmError>;

    /// Produce the patient's next line
    async fn complete(&self, instruction: &str, history: &[Turn]) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn classify(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).classify(prompt).await
    }

    async fn complete(&self, instruction: &str, history: &[Turn]) -> Result<String, LlmError> {
        (**self).complete(instruction, history).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Labels are one word; keep the budget tight
const CLASSIFY_MAX_TOKENS: u32 = 16;
const REPLY_MAX_TOKENS: u32 = 512;

/// Attempts per capability call, including the first
const MAX_ATTEMPTS: u32 = 3;

/// Adapter to use `ModelRegistry` as a `TextGenerator`
pub struct RegistryTextGenerator {
    registry: Arc<ModelRegistry>,
}

impl RegistryTextGenerator {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }
}

/// Map conversation history onto provider messages. The doctor speaks as
/// the user, the patient as the assistant. System lines go to the system
/// prompt instead, see `system_blocks`.
pub fn history_to_messages(history: &[Turn]) -> Vec<LlmMessage> {
    history
        .iter()
        .filter_map(|turn| match turn.role {
            Role::Doctor => Some(LlmMessage::user(turn.text.clone())),
            Role::Patient => Some(LlmMessage::assistant(turn.text.clone())),
            Role::System => None,
        })
        .collect()
}

/// The reply instruction first, then any system lines from the history in
/// order
fn system_blocks(instruction: &str, history: &[Turn]) -> Vec<SystemContent> {
    std::iter::once(SystemContent::new(instruction))
        .chain(
            history
                .iter()
                .filter(|turn| turn.role == Role::System)
                .map(|turn| SystemContent::new(turn.text.clone())),
        )
        .collect()
}

fn retry_delay(attempt: u32) -> Duration {
    // Exponential backoff: 1s, 2s, 4s
    Duration::from_secs(1 << (attempt - 1))
}

/// Send a request, retrying transient failures. The provider's
/// `retry_after` hint takes precedence over the backoff schedule.
async fn run(service: Option<Arc<dyn LlmService>>, request: LlmRequest) -> Result<String, LlmError> {
    let llm = service.ok_or_else(|| LlmError::network("No LLM available"))?;
    let mut attempt = 1;
    loop {
        match llm.complete(&request).await {
            Ok(response) => return Ok(response.text()),
            Err(e) if e.kind.is_retryable() && attempt < MAX_ATTEMPTS => {
                let delay = e.retry_after.unwrap_or_else(|| retry_delay(attempt));
                tracing::warn!(
                    model = %llm.model_id(),
                    attempt,
                    delay = ?delay,
                    kind = e.kind.as_str(),
                    "Retrying LLM request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl TextGenerator for RegistryTextGenerator {
    async fn classify(&self, prompt: &str) -> Result<String, LlmError> {
        let request = LlmRequest {
            system: vec![],
            messages: vec![LlmMessage::user(prompt)],
            max_tokens: Some(CLASSIFY_MAX_TOKENS),
        };
        run(self.registry.classifier(), request).await
    }

    async fn complete(&self, instruction: &str, history: &[Turn]) -> Result<String, LlmError> {
        let request = LlmRequest {
            system: system_blocks(instruction, history),
            messages: history_to_messages(history),
            max_tokens: Some(REPLY_MAX_TOKENS),
        };
        run(self.registry.patient(), request).await
    }
}
