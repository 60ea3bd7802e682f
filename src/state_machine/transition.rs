//! Pure state transition function
//!
//! One doctor message drives the phase through
//! `Idle -> Classifying -> Responding -> Idle`. Only the doctor line is
//! committed up front; stage, disclosure, acceptance and the patient reply
//! are committed together once the reply arrives.

use super::effect::Notice;
use super::state::{PatientUpdate, Stage, Turn};
use super::{ConvContext, Effect, Event, PatientState, TurnPhase};
use crate::treatment::Verdict;
use crate::{disclosure, intent, responder, treatment};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_phase: TurnPhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: TurnPhase) -> Self {
        Self {
            new_phase: phase,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Patient is still answering the previous message")]
    Busy,
    #[error("Doctor message is empty")]
    EmptyMessage,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// What the intermediate step decided for this turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnPlan {
    pub update: PatientUpdate,
    /// Set on treatment turns only
    pub verdict: Option<Verdict>,
}

/// Route a classified message to its intermediate step.
///
/// Greeting and general questions change nothing but the stage; symptom
/// inquiries may reveal symptoms; prescriptions recompute acceptance.
pub fn plan_turn(
    stage: Stage,
    patient: &PatientState,
    context: &ConvContext,
    message: &str,
) -> TurnPlan {
    let mut update = PatientUpdate {
        stage: Some(stage),
        ..PatientUpdate::default()
    };
    let mut verdict = None;

    match stage {
        Stage::Greeting | Stage::GeneralQuestion => {}
        Stage::SymptomInquiry => {
            update.revealed = disclosure::disclose(patient, message);
        }
        Stage::TreatmentPrescription => {
            let v = treatment::evaluate(context.entry.as_deref(), message);
            update.accepted = Some(v.is_accepted());
            verdict = Some(v);
        }
    }

    TurnPlan { update, verdict }
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(
    phase: &TurnPhase,
    patient: &PatientState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (phase, event) {
        // ============================================================
        // Doctor Messages
        // ============================================================

        // Idle/Failed + DoctorMessage -> Classifying
        (TurnPhase::Idle | TurnPhase::Failed { .. }, Event::DoctorMessage { text }) => {
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }

            // A resubmitted message after a failed turn reuses the
            // unanswered history entry instead of duplicating it
            let commit = (patient.unanswered_doctor_message() != Some(text.as_str()))
                .then(|| Effect::commit(PatientUpdate::append_turn(Turn::doctor(text.clone()))));

            Ok(TransitionResult::new(TurnPhase::Classifying {
                message: text.clone(),
            })
            .with_effects(commit)
            .with_effect(Effect::RequestClassification {
                prompt: intent::build_prompt(&text),
            }))
        }

        // Busy + DoctorMessage -> reject
        (phase, Event::DoctorMessage { .. }) if phase.is_busy() => Err(TransitionError::Busy),

        // ============================================================
        // Classification
        // ============================================================

        // Classifying + StageClassified -> Responding
        (TurnPhase::Classifying { message }, Event::StageClassified { stage }) => {
            let plan = plan_turn(stage, patient, context, message);
            let projected = patient.preview(&plan.update);
            let instruction = responder::build_instruction(&projected, message);

            Ok(TransitionResult::new(TurnPhase::Responding {
                pending: plan.update,
                verdict: plan.verdict,
            })
            .with_effect(Effect::RequestReply { instruction }))
        }

        // ============================================================
        // Reply
        // ============================================================

        // Responding + ReplyGenerated -> Idle, commit everything at once
        (TurnPhase::Responding { pending, .. }, Event::ReplyGenerated { text }) => {
            let reply = responder::sanitize_reply(&text);
            let mut update = pending.clone();
            update.append.push(Turn::patient(reply.clone()));
            let after = patient.preview(&update);

            let complete = after
                .accepted
                .then(|| Effect::notify(Notice::ConversationComplete));

            Ok(TransitionResult::new(TurnPhase::Idle)
                .with_effect(Effect::commit(update))
                .with_effect(Effect::notify(Notice::PatientResponse {
                    reply,
                    stage: after.stage,
                    accepted: after.accepted,
                    revealed_symptoms: after.revealed_symptoms,
                }))
                .with_effects(complete))
        }

        // ============================================================
        // Capability Failures
        // ============================================================

        // Classifying/Responding + LlmError -> Failed, nothing committed
        (
            TurnPhase::Classifying { .. } | TurnPhase::Responding { .. },
            Event::LlmError {
                message,
                error_kind,
            },
        ) => Ok(TransitionResult::new(TurnPhase::Failed {
            message: message.clone(),
            error_kind,
        })
        .with_effect(Effect::notify_turn_failed(message))),

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {phase:?} with event {event:?}"
        ))),
    }
}
