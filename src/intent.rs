//! Intent classification of doctor messages
//!
//! The capability is asked for a bare stage label. Its answer is validated
//! against the closed `Stage` enumeration; anything else falls back to
//! `Stage::GeneralQuestion` so routing never sees an unknown label.

use crate::state_machine::Stage;
use thiserror::Error;

/// Stage used when the classifier answers outside the enumeration
pub const FALLBACK_STAGE: Stage = Stage::GeneralQuestion;

/// The classifier produced something other than one of the four labels
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized intent label: {label:?}")]
pub struct ClassificationError {
    pub label: String,
}

/// Build the classification prompt for a doctor message
pub fn build_prompt(doctor_message: &str) -> String {
    let labels: Vec<&str> = Stage::ALL.iter().map(|s| s.label()).collect();
    format!(
        "Given the message said by the Doctor: {doctor_message}, determine its intent \
         based on these classifications: {}. Do not add any other classes. \
         Reply with exactly one classification and no other text.",
        labels.join(", ")
    )
}

/// Trim the raw answer and match it exactly against the stage labels
pub fn parse_stage(raw: &str) -> Result<Stage, ClassificationError> {
    let label = raw.trim();
    Stage::from_label(label).ok_or_else(|| ClassificationError {
        label: label.to_string(),
    })
}

/// Like `parse_stage`, but unmatched labels are logged and mapped to
/// `FALLBACK_STAGE`
pub fn resolve_stage(conv_id: &str, raw: &str) -> Stage {
    parse_stage(raw).unwrap_or_else(|e| {
        tracing::warn!(
            conv_id = %conv_id,
            error = %e,
            fallback = %FALLBACK_STAGE,
            "Classifier returned an unknown stage, falling back"
        );
        FALLBACK_STAGE
    })
}
