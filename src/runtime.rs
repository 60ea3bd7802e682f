//! Runtime for executing patient conversations
//!
//! The manager owns every live conversation. Each one sits behind its own
//! async mutex so turns within a conversation are strictly serialized,
//! while distinct conversations proceed in parallel and share only the
//! read-only catalog.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::PatientRuntime;
pub use traits::*;

use crate::catalog::{self, Catalog};
use crate::llm::LlmErrorKind;
use crate::state_machine::{ConvContext, PatientState, Stage, TransitionError, Turn};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Type alias for the runtime the manager drives
pub type ProductionRuntime = PatientRuntime<dyn TextGenerator>;

// ============================================================================
// Configuration
// ============================================================================

/// Runtime tuning, read from the environment at startup
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bound on each classify/complete call
    pub llm_timeout: Duration,
    pub min_symptoms: usize,
    pub max_symptoms: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            llm_timeout: Duration::from_secs(60),
            min_symptoms: 4,
            max_symptoms: 6,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let llm_timeout = env_parse("PATIENT_SIM_LLM_TIMEOUT_SECS")
            .map_or(defaults.llm_timeout, Duration::from_secs);
        let min_symptoms = env_parse("PATIENT_SIM_MIN_SYMPTOMS").unwrap_or(defaults.min_symptoms);
        let max_symptoms = env_parse("PATIENT_SIM_MAX_SYMPTOMS")
            .unwrap_or(defaults.max_symptoms)
            .max(min_symptoms);
        Self {
            llm_timeout,
            min_symptoms,
            max_symptoms,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

// ============================================================================
// Outcomes and Errors
// ============================================================================

/// Result of one completed doctor turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub reply_text: String,
    /// Everything revealed so far, not just this turn
    pub revealed_symptoms: Vec<String>,
    pub stage: Stage,
    pub accepted: bool,
    pub conversation_complete: bool,
}

/// A freshly started conversation
#[derive(Debug, Clone, Serialize)]
pub struct StartedConversation {
    pub conversation_id: String,
    pub condition: String,
    pub symptom_count: usize,
}

/// Listing entry for a doctor's patients
#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub patient_id: String,
    pub condition: String,
    pub stage: Stage,
    pub accepted: bool,
    pub revealed_symptoms: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Conversation not found: {0}")]
    NotFound(String),
    #[error("Patient is still answering the previous message")]
    Busy,
    #[error("Text generation failed ({}): {message}", .kind.as_str())]
    Generation { kind: LlmErrorKind, message: String },
    #[error("Text generation timed out: {0}")]
    Timeout(String),
    #[error("Conversation ended during the turn")]
    Cancelled,
    #[error("Turn task aborted: {0}")]
    Aborted(String),
    #[error(transparent)]
    Transition(TransitionError),
}

impl From<TransitionError> for TurnError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Busy => TurnError::Busy,
            other => TurnError::Transition(other),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("Unknown condition: {0}")]
    UnknownCondition(String),
    #[error("No conditions configured")]
    EmptyCatalog,
}

// ============================================================================
// Client Events
// ============================================================================

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init {
        patient: PatientSummary,
        history: Vec<Turn>,
    },
    PatientResponse {
        reply: String,
        stage: Stage,
        accepted: bool,
        revealed_symptoms: Vec<String>,
    },
    ConversationComplete,
    Error {
        message: String,
    },
}

// ============================================================================
// Manager
// ============================================================================

/// Handle to one live conversation
pub struct ConversationHandle {
    pub doctor_id: String,
    pub created_at: DateTime<Utc>,
    runtime: Arc<Mutex<ProductionRuntime>>,
    /// Last settled state, readable while a turn is in flight
    snapshot: watch::Sender<PatientState>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
    cancel: CancellationToken,
}

impl ConversationHandle {
    fn summary(&self, patient_id: &str) -> PatientSummary {
        let state = self.snapshot.borrow();
        PatientSummary {
            patient_id: patient_id.to_string(),
            condition: state.condition.clone(),
            stage: state.stage,
            accepted: state.accepted,
            revealed_symptoms: state.revealed_symptoms.clone(),
            created_at: self.created_at,
        }
    }
}

/// Manager for all patient conversations
pub struct ConversationManager {
    catalog: Arc<Catalog>,
    generator: Arc<dyn TextGenerator>,
    config: RuntimeConfig,
    conversations: RwLock<HashMap<String, Arc<ConversationHandle>>>,
}

impl ConversationManager {
    pub fn new(
        catalog: Arc<Catalog>,
        generator: Arc<dyn TextGenerator>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            catalog,
            generator,
            config,
            conversations: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Create a patient for `doctor_id`, with a random condition unless one
    /// is named
    pub async fn start_conversation(
        &self,
        doctor_id: &str,
        condition: Option<&str>,
    ) -> Result<StartedConversation, StartError> {
        if self.catalog.is_empty() {
            return Err(StartError::EmptyCatalog);
        }

        let (entry, symptoms) = {
            let mut rng = rand::thread_rng();
            let entry = match condition {
                Some(name) => self
                    .catalog
                    .get(name)
                    .ok_or_else(|| StartError::UnknownCondition(name.to_string()))?,
                None => self
                    .catalog
                    .choose(&mut rng)
                    .ok_or(StartError::EmptyCatalog)?,
            };
            let symptoms = catalog::symptom_prefix(
                &entry,
                self.config.min_symptoms,
                self.config.max_symptoms,
                &mut rng,
            );
            (entry, symptoms)
        };

        let conversation_id = format!("patient_{}", uuid::Uuid::new_v4().simple());
        let started = StartedConversation {
            conversation_id: conversation_id.clone(),
            condition: entry.name.clone(),
            symptom_count: symptoms.len(),
        };

        let patient = PatientState::new(entry.name.clone(), symptoms);
        let context = ConvContext::new(&conversation_id, Some(entry));
        let (broadcast_tx, _) = broadcast::channel(128);
        let (snapshot, _) = watch::channel(patient.clone());
        let cancel = CancellationToken::new();

        let runtime: ProductionRuntime = PatientRuntime::new(
            context,
            patient,
            Arc::clone(&self.generator),
            broadcast_tx.clone(),
            cancel.clone(),
            self.config.llm_timeout,
        );

        let handle = Arc::new(ConversationHandle {
            doctor_id: doctor_id.to_string(),
            created_at: Utc::now(),
            runtime: Arc::new(Mutex::new(runtime)),
            snapshot,
            broadcast_tx,
            cancel,
        });

        self.conversations
            .write()
            .await
            .insert(conversation_id.clone(), handle);

        tracing::info!(
            conv_id = %conversation_id,
            doctor_id = %doctor_id,
            condition = %started.condition,
            symptoms = started.symptom_count,
            "Patient created"
        );

        Ok(started)
    }

    async fn handle(&self, conversation_id: &str) -> Result<Arc<ConversationHandle>, TurnError> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| TurnError::NotFound(conversation_id.to_string()))
    }

    /// Run one doctor message. Fails fast with `Busy` if a turn is already
    /// outstanding for this conversation.
    ///
    /// The turn runs on its own task, so it settles to idle or failed even
    /// if the caller stops waiting for it.
    pub async fn process_turn(
        &self,
        conversation_id: &str,
        doctor_message: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let handle = self.handle(conversation_id).await?;
        let mut runtime = Arc::clone(&handle.runtime)
            .try_lock_owned()
            .map_err(|_| TurnError::Busy)?;

        let message = doctor_message.to_string();
        let task = tokio::spawn(async move {
            let result = runtime.process_turn(&message).await;
            handle.snapshot.send_replace(runtime.patient().clone());
            result
        });

        task.await.map_err(|e| {
            tracing::error!(conv_id = %conversation_id, error = %e, "Turn task died");
            TurnError::Aborted(e.to_string())
        })?
    }

    /// Drop a conversation and abandon any in-flight call. Ending an
    /// unknown or already ended conversation is a no-op.
    pub async fn end_conversation(&self, conversation_id: &str) -> bool {
        let removed = self.conversations.write().await.remove(conversation_id);
        match removed {
            Some(handle) => {
                handle.cancel.cancel();
                tracing::info!(conv_id = %conversation_id, "Conversation ended");
                true
            }
            None => false,
        }
    }

    /// Summaries of a doctor's live patients, oldest first
    pub async fn list_patients(&self, doctor_id: &str) -> Vec<PatientSummary> {
        let conversations = self.conversations.read().await;
        let mut patients: Vec<_> = conversations
            .iter()
            .filter(|(_, handle)| handle.doctor_id == doctor_id)
            .map(|(id, handle)| handle.summary(id))
            .collect();
        patients.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.patient_id.cmp(&b.patient_id))
        });
        patients
    }

    /// Subscribe to conversation updates. Returns the init event to send
    /// first, built from the last settled state.
    pub async fn subscribe(
        &self,
        conversation_id: &str,
    ) -> Result<(SseEvent, broadcast::Receiver<SseEvent>), TurnError> {
        let handle = self.handle(conversation_id).await?;
        let rx = handle.broadcast_tx.subscribe();
        let init = SseEvent::Init {
            patient: handle.summary(conversation_id),
            history: handle.snapshot.borrow().history.clone(),
        };
        Ok((init, rx))
    }
}
