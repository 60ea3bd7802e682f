//! Conversation state types

use crate::catalog::ConditionEntry;
use crate::llm::LlmErrorKind;
use crate::treatment::Verdict;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Stage
// ============================================================================

/// Intent category of the doctor's latest message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Greeting,
    SymptomInquiry,
    TreatmentPrescription,
    GeneralQuestion,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Greeting,
        Stage::SymptomInquiry,
        Stage::TreatmentPrescription,
        Stage::GeneralQuestion,
    ];

    /// Wire label, as the classifier is asked to produce it
    pub fn label(self) -> &'static str {
        match self {
            Stage::Greeting => "greeting",
            Stage::SymptomInquiry => "symptom_inquiry",
            Stage::TreatmentPrescription => "treatment_prescription",
            Stage::GeneralQuestion => "general_question",
        }
    }

    /// Exact match against the four labels. Anything else is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// History
// ============================================================================

/// Who said a line of the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Patient,
    /// Operator note; never spoken aloud, folded into the reply instruction
    System,
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn doctor(text: impl Into<String>) -> Self {
        Self {
            role: Role::Doctor,
            text: text.into(),
        }
    }

    pub fn patient(text: impl Into<String>) -> Self {
        Self {
            role: Role::Patient,
            text: text.into(),
        }
    }
}

// ============================================================================
// Patient State
// ============================================================================

/// The mutable record of one patient conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientState {
    pub history: Vec<Turn>,
    pub condition: String,
    pub all_symptoms: Vec<String>,
    pub revealed_symptoms: Vec<String>,
    pub stage: Stage,
    pub accepted: bool,
}

/// Partial update to a `PatientState`.
///
/// `append` and `revealed` concatenate onto the existing lists; `stage` and
/// `accepted` replace the current value only when set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatientUpdate {
    pub append: Vec<Turn>,
    pub stage: Option<Stage>,
    pub revealed: Vec<String>,
    pub accepted: Option<bool>,
}

impl PatientUpdate {
    pub fn append_turn(turn: Turn) -> Self {
        Self {
            append: vec![turn],
            ..Self::default()
        }
    }
}

impl PatientState {
    pub fn new(condition: impl Into<String>, all_symptoms: Vec<String>) -> Self {
        Self {
            history: Vec::new(),
            condition: condition.into(),
            all_symptoms,
            revealed_symptoms: Vec::new(),
            stage: Stage::Greeting,
            accepted: false,
        }
    }

    /// Apply a partial update. This is the only way the state changes.
    pub fn apply(&mut self, update: PatientUpdate) {
        self.history.extend(update.append);
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
        for symptom in update.revealed {
            if self.all_symptoms.contains(&symptom) && !self.revealed_symptoms.contains(&symptom)
            {
                self.revealed_symptoms.push(symptom);
            }
        }
        if let Some(accepted) = update.accepted {
            self.accepted = accepted;
        }
    }

    /// Copy of the state with `update` applied, leaving `self` untouched
    pub fn preview(&self, update: &PatientUpdate) -> Self {
        let mut next = self.clone();
        next.apply(update.clone());
        next
    }

    /// Symptoms not yet revealed, in catalog order
    pub fn remaining_symptoms(&self) -> Vec<&str> {
        self.all_symptoms
            .iter()
            .filter(|s| !self.revealed_symptoms.contains(s))
            .map(String::as_str)
            .collect()
    }

    pub fn is_fully_disclosed(&self) -> bool {
        self.remaining_symptoms().is_empty()
    }

    /// The last history entry, if it is a doctor line with no reply yet
    pub fn unanswered_doctor_message(&self) -> Option<&str> {
        match self.history.last() {
            Some(Turn {
                role: Role::Doctor,
                text,
            }) => Some(text),
            _ => None,
        }
    }
}

// ============================================================================
// Turn Phase
// ============================================================================

/// Where the orchestrator is within the current turn
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// Ready for the next doctor message
    #[default]
    Idle,

    /// Waiting for the intent classifier
    Classifying { message: String },

    /// Waiting for the patient reply; `pending` is committed with it
    Responding {
        pending: PatientUpdate,
        /// Treatment outcome, for treatment turns
        verdict: Option<Verdict>,
    },

    /// The last turn did not complete; state is as before that turn
    Failed {
        message: String,
        error_kind: LlmErrorKind,
    },
}

impl TurnPhase {
    /// Check if a turn is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            TurnPhase::Classifying { .. } | TurnPhase::Responding { .. }
        )
    }
}

// ============================================================================
// Context
// ============================================================================

/// Context for a conversation (immutable configuration)
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub conversation_id: String,
    /// Catalog entry for the assigned condition; `None` when the condition
    /// is not in the catalog
    pub entry: Option<Arc<ConditionEntry>>,
}

impl ConvContext {
    pub fn new(conversation_id: impl Into<String>, entry: Option<Arc<ConditionEntry>>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            entry,
        }
    }
}
