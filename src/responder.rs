//! Patient reply instructions
//!
//! Selects the instruction template for the turn from the already-resolved
//! state (stage, acceptance, revealed symptoms) and cleans up the generated
//! reply before it enters the history.

use crate::state_machine::{PatientState, Stage};
use regex::Regex;
use std::sync::LazyLock;

/// Prefix shared by every template: stay in character, keep the condition
/// hidden.
fn persona(condition: &str) -> String {
    format!(
        "You are chatting online as a patient. Do not reveal, name or hint at your \
         underlying condition: {condition}. Speak in the first person."
    )
}

const NO_ACTIONS: &str = "Avoid stage directions or emotive actions (no asterisks).";

/// Build the system instruction for the patient's reply.
///
/// `state` must already reflect this turn's stage, disclosure and treatment
/// outcome; `doctor_message` is the message being answered.
pub fn build_instruction(state: &PatientState, doctor_message: &str) -> String {
    let persona = persona(&state.condition);
    let body = match state.stage {
        Stage::Greeting => format!(
            "The doctor said: {doctor_message}. If the doctor greets you or makes small \
             talk, respond like a real person chatting with their doctor. Keep it brief \
             and natural. Mention how you feel without listing specific symptoms yet."
        ),
        Stage::GeneralQuestion => format!(
            "The doctor asked: {doctor_message}. Respond naturally as a real patient \
             would in a chat with their doctor. Keep it concise and on-topic."
        ),
        Stage::SymptomInquiry if state.revealed_symptoms.is_empty() => {
            "Respond naturally to the doctor's small talk or symptom questions in a \
             concise chat style without describing any specific symptom."
                .to_string()
        }
        Stage::SymptomInquiry => format!(
            "You can mention these symptoms only: {}. Share them naturally in a concise \
             chat reply.",
            state.revealed_symptoms.join(", ")
        ),
        Stage::TreatmentPrescription if state.accepted => format!(
            "The doctor prescribed: {doctor_message}. Acknowledge and accept the \
             treatment politely, keep it brief like a chat, and say goodbye."
        ),
        Stage::TreatmentPrescription => format!(
            "The doctor prescribed: {doctor_message}. Politely decline and ask for an \
             alternative in a concise chat response."
        ),
    };
    format!("{persona} {body} {NO_ACTIONS}")
}

static ACTION_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*[^*]*\*|\*").expect("valid action markup pattern"));
static EXTRA_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid whitespace pattern"));

/// Strip `*action*` markup from a generated reply.
///
/// Falls back to the trimmed raw text if nothing is left after stripping.
pub fn sanitize_reply(raw: &str) -> String {
    let stripped = ACTION_MARKUP.replace_all(raw, "");
    let collapsed = EXTRA_SPACE.replace_all(&stripped, " ");
    let cleaned = collapsed.trim();
    if cleaned.is_empty() {
        raw.trim().to_string()
    } else {
        cleaned.to_string()
    }
}
