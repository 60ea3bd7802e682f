//! Symptom disclosure policy
//!
//! On a symptom-inquiry turn the patient reveals at most two more symptoms,
//! in catalog order, and only if the doctor actually asked about how they
//! feel.

use crate::state_machine::PatientState;

/// Phrases that count as asking the patient about their symptoms
pub const PROBE_KEYWORDS: &[&str] = &[
    "symptoms",
    "feeling",
    "experiencing",
    "what's wrong",
    "how are you",
];

pub const MAX_REVEAL_PER_TURN: usize = 2;

/// Case-insensitive probe match. Curly apostrophes are folded so that
/// "what’s wrong" matches as well.
pub fn solicits_symptoms(message: &str) -> bool {
    let lowered = message.to_lowercase().replace('\u{2019}', "'");
    PROBE_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// Symptoms to reveal this turn. Empty when everything is already revealed
/// or the message does not probe for symptoms.
pub fn disclose(state: &PatientState, message: &str) -> Vec<String> {
    if state.is_fully_disclosed() || !solicits_symptoms(message) {
        return Vec::new();
    }
    state
        .remaining_symptoms()
        .into_iter()
        .take(MAX_REVEAL_PER_TURN)
        .map(str::to_string)
        .collect()
}
