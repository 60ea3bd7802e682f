//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ConditionsResponse, CreatePatientRequest, CreatePatientResponse, DoctorMessageRequest,
    ErrorResponse, ModelsResponse, PatientListResponse, SuccessResponse, TurnResponse,
};
use super::AppState;
use crate::runtime::{StartError, TurnError};
use crate::state_machine::TransitionError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Patient lifecycle
        .route("/api/doctor/:doctor_id/create-patient", post(create_patient))
        .route("/api/doctor/:doctor_id/patients", get(list_patients))
        .route("/api/patients/:id/end", post(end_patient))
        // Dialog
        .route("/api/patients/:id/messages", post(send_message))
        .route("/api/patients/:id/stream", get(stream_patient))
        // Catalog and model info
        .route("/api/conditions", get(list_conditions))
        .route("/api/models", get(list_models))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Patient Lifecycle
// ============================================================

async fn create_patient(
    State(state): State<AppState>,
    Path(doctor_id): Path<String>,
    body: Option<Json<CreatePatientRequest>>,
) -> Result<Json<CreatePatientResponse>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let started = state
        .manager
        .start_conversation(&doctor_id, req.condition.as_deref())
        .await?;
    Ok(Json(started.into()))
}

async fn list_patients(
    State(state): State<AppState>,
    Path(doctor_id): Path<String>,
) -> Json<PatientListResponse> {
    Json(PatientListResponse {
        patients: state.manager.list_patients(&doctor_id).await,
    })
}

async fn end_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<SuccessResponse> {
    let success = state.manager.end_conversation(&id).await;
    Json(SuccessResponse { success })
}

// ============================================================
// Dialog
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DoctorMessageRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let outcome = state.manager.process_turn(&id, &req.message).await?;
    Ok(Json(TurnResponse {
        patient_id: id,
        outcome,
    }))
}

async fn stream_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (init, rx) = state.manager.subscribe(&id).await?;
    Ok(sse_stream(init, rx))
}

// ============================================================
// Catalog and Models
// ============================================================

async fn list_conditions(State(state): State<AppState>) -> Json<ConditionsResponse> {
    Json(ConditionsResponse {
        conditions: state.manager.catalog().names(),
    })
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.llm_registry.available_model_info(),
        patient_model: state.llm_registry.patient_model_id().to_string(),
        classifier_model: state.llm_registry.classifier_model_id().to_string(),
    })
}

async fn get_version() -> &'static str {
    concat!("patient-sim ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    GatewayTimeout(String),
    Internal(String),
}

impl From<TurnError> for AppError {
    fn from(e: TurnError) -> Self {
        let message = e.to_string();
        match e {
            TurnError::NotFound(_) => AppError::NotFound(message),
            TurnError::Busy | TurnError::Cancelled => AppError::Conflict(message),
            TurnError::Generation { .. } => AppError::BadGateway(message),
            TurnError::Timeout(_) => AppError::GatewayTimeout(message),
            TurnError::Transition(TransitionError::EmptyMessage) => AppError::BadRequest(message),
            TurnError::Transition(_) | TurnError::Aborted(_) => AppError::Internal(message),
        }
    }
}

impl From<StartError> for AppError {
    fn from(e: StartError) -> Self {
        let message = e.to_string();
        match e {
            StartError::UnknownCondition(_) => AppError::BadRequest(message),
            StartError::EmptyCatalog => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
