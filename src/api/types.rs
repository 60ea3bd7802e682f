//! API request and response types

use crate::runtime::{PatientSummary, StartedConversation, TurnOutcome};
use serde::{Deserialize, Serialize};

/// Request to create a patient; an empty body picks a random condition
#[derive(Debug, Default, Deserialize)]
pub struct CreatePatientRequest {
    pub condition: Option<String>,
}

/// Response for a created patient
#[derive(Debug, Serialize)]
pub struct CreatePatientResponse {
    pub patient_id: String,
    pub condition: String,
    pub total_symptoms: usize,
}

impl From<StartedConversation> for CreatePatientResponse {
    fn from(started: StartedConversation) -> Self {
        Self {
            patient_id: started.conversation_id,
            condition: started.condition,
            total_symptoms: started.symptom_count,
        }
    }
}

/// Response with a doctor's patients
#[derive(Debug, Serialize)]
pub struct PatientListResponse {
    pub patients: Vec<PatientSummary>,
}

/// Request to send a doctor message
#[derive(Debug, Deserialize)]
pub struct DoctorMessageRequest {
    pub message: String,
}

/// Response for a completed turn
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub patient_id: String,
    #[serde(flatten)]
    pub outcome: TurnOutcome,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Response with the catalog's condition names
#[derive(Debug, Serialize)]
pub struct ConditionsResponse {
    pub conditions: Vec<String>,
}

/// Model information with metadata
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub description: String,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub patient_model: String,
    pub classifier_model: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
