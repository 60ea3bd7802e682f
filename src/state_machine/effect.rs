//! Effects produced by state transitions

use crate::state_machine::state::{PatientUpdate, Stage};

/// Effects to be executed after state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Apply a partial update to the patient state
    CommitUpdate { update: PatientUpdate },

    /// Ask the capability to label the doctor's message
    RequestClassification { prompt: String },

    /// Ask the capability for the patient's reply to the current history
    RequestReply { instruction: String },

    /// Notify connected clients
    NotifyClient { notice: Notice },
}

/// Client-facing outcome of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    PatientResponse {
        reply: String,
        stage: Stage,
        accepted: bool,
        revealed_symptoms: Vec<String>,
    },
    ConversationComplete,
    TurnFailed {
        message: String,
    },
}

impl Effect {
    pub fn commit(update: PatientUpdate) -> Self {
        Effect::CommitUpdate { update }
    }

    pub fn notify(notice: Notice) -> Self {
        Effect::NotifyClient { notice }
    }

    pub fn notify_turn_failed(message: impl Into<String>) -> Self {
        Effect::NotifyClient {
            notice: Notice::TurnFailed {
                message: message.into(),
            },
        }
    }
}
