//! Patient runtime executor

use super::traits::TextGenerator;
use super::{SseEvent, TurnError, TurnOutcome};

use crate::intent;
use crate::llm::{LlmError, LlmErrorKind};
use crate::state_machine::{
    transition, ConvContext, Effect, Event, Notice, PatientState, TransitionError, TurnPhase,
};
use crate::treatment::Verdict;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Generic patient runtime that can work with any text generator
pub struct PatientRuntime<G>
where
    G: TextGenerator + ?Sized + 'static,
{
    context: ConvContext,
    phase: TurnPhase,
    patient: PatientState,
    generator: Arc<G>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    /// Fired when the conversation is ended mid-turn
    cancel: CancellationToken,
    llm_timeout: Duration,
}

impl<G> PatientRuntime<G>
where
    G: TextGenerator + ?Sized + 'static,
{
    pub fn new(
        context: ConvContext,
        patient: PatientState,
        generator: Arc<G>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        cancel: CancellationToken,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            context,
            phase: TurnPhase::Idle,
            patient,
            generator,
            broadcast_tx,
            cancel,
            llm_timeout,
        }
    }

    pub fn patient(&self) -> &PatientState {
        &self.patient
    }

    #[cfg(test)]
    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    /// Run one doctor message through the policy to completion
    pub async fn process_turn(&mut self, text: &str) -> Result<TurnOutcome, TurnError> {
        let conv_id = self.context.conversation_id.clone();
        tracing::info!(conv_id = %conv_id, text = %text, "Doctor says");

        let mut outcome: Option<TurnOutcome> = None;

        // We process events in a loop to handle chained effects
        let mut events_to_process = vec![Event::DoctorMessage {
            text: text.to_string(),
        }];

        while let Some(current_event) = events_to_process.pop() {
            // Pure state transition
            let result = transition(&self.phase, &self.patient, &self.context, current_event)?;
            self.phase = result.new_phase;

            if let TurnPhase::Responding { pending, verdict } = &self.phase {
                tracing::info!(
                    conv_id = %conv_id,
                    stage = ?pending.stage,
                    revealed = pending.revealed.len(),
                    verdict = ?verdict.map(Verdict::as_str),
                    "Turn routed"
                );
            }

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect, &mut outcome).await? {
                    events_to_process.push(generated_event);
                }
            }
        }

        match &self.phase {
            TurnPhase::Idle => outcome.ok_or_else(|| {
                TransitionError::InvalidTransition("turn finished without a reply".to_string())
                    .into()
            }),
            TurnPhase::Failed {
                message,
                error_kind: LlmErrorKind::Timeout,
            } => Err(TurnError::Timeout(message.clone())),
            TurnPhase::Failed {
                message,
                error_kind,
            } => Err(TurnError::Generation {
                kind: *error_kind,
                message: message.clone(),
            }),
            phase => Err(TransitionError::InvalidTransition(format!(
                "turn stalled in {phase:?}"
            ))
            .into()),
        }
    }

    async fn execute_effect(
        &mut self,
        effect: Effect,
        outcome: &mut Option<TurnOutcome>,
    ) -> Result<Option<Event>, TurnError> {
        match effect {
            Effect::CommitUpdate { update } => {
                self.patient.apply(update);
                Ok(None)
            }

            Effect::RequestClassification { prompt } => {
                let generator = Arc::clone(&self.generator);
                let result = self.guarded(generator.classify(&prompt)).await?;
                Ok(Some(match result {
                    Ok(raw) => Event::StageClassified {
                        stage: intent::resolve_stage(&self.context.conversation_id, &raw),
                    },
                    Err(e) => llm_error_event(e),
                }))
            }

            Effect::RequestReply { instruction } => {
                let generator = Arc::clone(&self.generator);
                let history = self.patient.history.clone();
                let result = self
                    .guarded(generator.complete(&instruction, &history))
                    .await?;
                Ok(Some(match result {
                    Ok(text) => Event::ReplyGenerated { text },
                    Err(e) => llm_error_event(e),
                }))
            }

            Effect::NotifyClient { notice } => {
                self.notify(notice, outcome);
                Ok(None)
            }
        }
    }

    /// Bound a capability call by the configured timeout and the
    /// conversation's cancellation token
    async fn guarded<F>(&mut self, call: F) -> Result<Result<String, LlmError>, TurnError>
    where
        F: Future<Output = Result<String, LlmError>>,
    {
        let cancel = self.cancel.clone();
        let limit = self.llm_timeout;

        tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!(conv_id = %self.context.conversation_id, "Turn cancelled");
                self.phase = TurnPhase::Failed {
                    message: "conversation ended".to_string(),
                    error_kind: LlmErrorKind::Unknown,
                };
                Err(TurnError::Cancelled)
            }
            result = tokio::time::timeout(limit, call) => Ok(result.unwrap_or_else(|_| {
                Err(LlmError::timeout(format!(
                    "No response within {}s",
                    limit.as_secs()
                )))
            })),
        }
    }

    fn notify(&self, notice: Notice, outcome: &mut Option<TurnOutcome>) {
        let event = match notice {
            Notice::PatientResponse {
                reply,
                stage,
                accepted,
                revealed_symptoms,
            } => {
                tracing::info!(
                    conv_id = %self.context.conversation_id,
                    text = %reply,
                    stage = stage.label(),
                    accepted,
                    revealed = revealed_symptoms.len(),
                    "Patient says"
                );
                *outcome = Some(TurnOutcome {
                    reply_text: reply.clone(),
                    revealed_symptoms: revealed_symptoms.clone(),
                    stage,
                    accepted,
                    conversation_complete: false,
                });
                SseEvent::PatientResponse {
                    reply,
                    stage,
                    accepted,
                    revealed_symptoms,
                }
            }
            Notice::ConversationComplete => {
                if let Some(outcome) = outcome.as_mut() {
                    outcome.conversation_complete = true;
                }
                tracing::info!(conv_id = %self.context.conversation_id, "Treatment accepted");
                SseEvent::ConversationComplete
            }
            Notice::TurnFailed { message } => {
                tracing::warn!(
                    conv_id = %self.context.conversation_id,
                    error = %message,
                    "Turn failed"
                );
                SseEvent::Error { message }
            }
        };

        // No subscribers is fine
        let _ = self.broadcast_tx.send(event);
    }
}

fn llm_error_event(e: LlmError) -> Event {
    Event::LlmError {
        message: e.message,
        error_kind: e.kind,
    }
}
