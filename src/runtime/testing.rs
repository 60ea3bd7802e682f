//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::state_machine::Turn;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

// ============================================================================
// Mock Text Generator
// ============================================================================

/// Mock text generator that returns queued labels and replies
#[derive(Default)]
pub struct MockTextGenerator {
    labels: Mutex<VecDeque<Result<String, LlmError>>>,
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    /// Record of classification prompts
    pub prompts: Mutex<Vec<String>>,
    /// Record of reply requests: instruction and the history it was given
    pub completions: Mutex<Vec<(String, Vec<Turn>)>>,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a classifier answer
    pub fn queue_label(&self, label: &str) {
        self.labels.lock().unwrap().push_back(Ok(label.to_string()));
    }

    pub fn queue_label_error(&self, error: LlmError) {
        self.labels.lock().unwrap().push_back(Err(error));
    }

    /// Queue a patient reply
    pub fn queue_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn queue_reply_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Queue a full turn: label then reply
    pub fn queue_turn(&self, label: &str, reply: &str) {
        self.queue_label(label);
        self.queue_reply(reply);
    }

    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn recorded_completions(&self) -> Vec<(String, Vec<Turn>)> {
        self.completions.lock().unwrap().clone()
    }
}

fn pop(queue: &Mutex<VecDeque<Result<String, LlmError>>>) -> Result<String, LlmError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn classify(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        pop(&self.labels)
    }

    async fn complete(&self, instruction: &str, history: &[Turn]) -> Result<String, LlmError> {
        self.completions
            .lock()
            .unwrap()
            .push((instruction.to_string(), history.to_vec()));
        pop(&self.replies)
    }
}

// ============================================================================
// Gated Text Generator
// ============================================================================

/// Text generator whose classification blocks until released, for
/// concurrency and cancellation tests
#[derive(Default)]
pub struct GatedTextGenerator {
    pub inner: MockTextGenerator,
    entered: Notify,
    release: Notify,
}

impl GatedTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a classification call is in flight
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let one blocked classification proceed
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl TextGenerator for GatedTextGenerator {
    async fn classify(&self, prompt: &str) -> Result<String, LlmError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.classify(prompt).await
    }

    async fn complete(&self, instruction: &str, history: &[Turn]) -> Result<String, LlmError> {
        self.inner.complete(instruction, history).await
    }
}

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock provider that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(LlmResponse::from_text(text)));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ConditionEntry};
    use crate::llm::{LlmErrorKind, MessageRole, ModelRegistry};
    use crate::runtime::{
        ConversationManager, PatientRuntime, RuntimeConfig, SseEvent, StartError, TurnError,
    };
    use crate::state_machine::{ConvContext, PatientState, Role, Stage, TurnPhase};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio_util::sync::CancellationToken;

    const COLD_SYMPTOMS: [&str; 4] = ["runny nose", "sore throat", "mild cough", "congestion"];

    fn cold_patient() -> PatientState {
        PatientState::new(
            "common cold",
            COLD_SYMPTOMS.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    fn runtime_for<G: TextGenerator + 'static>(
        generator: Arc<G>,
        patient: PatientState,
        entry: Option<Arc<ConditionEntry>>,
    ) -> (PatientRuntime<G>, broadcast::Receiver<SseEvent>) {
        let (tx, rx) = broadcast::channel(32);
        let runtime = PatientRuntime::new(
            ConvContext::new("test-conv", entry),
            patient,
            generator,
            tx,
            CancellationToken::new(),
            Duration::from_secs(5),
        );
        (runtime, rx)
    }

    fn cold_runtime(
        generator: Arc<MockTextGenerator>,
    ) -> (PatientRuntime<MockTextGenerator>, broadcast::Receiver<SseEvent>) {
        let entry = Catalog::builtin().get("common cold");
        runtime_for(generator, cold_patient(), entry)
    }

    fn four_symptom_config() -> RuntimeConfig {
        RuntimeConfig {
            llm_timeout: Duration::from_secs(5),
            min_symptoms: 4,
            max_symptoms: 4,
        }
    }

    fn manager_with(generator: Arc<dyn TextGenerator>) -> Arc<ConversationManager> {
        Arc::new(ConversationManager::new(
            Arc::new(Catalog::builtin()),
            generator,
            four_symptom_config(),
        ))
    }

    #[tokio::test]
    async fn test_common_cold_walkthrough() {
        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_turn("greeting", "Hi doctor.");
        llm.queue_turn("symptom_inquiry", "*sniffles* Not great, honestly.");
        llm.queue_turn("symptom_inquiry", "It's been a rough week.");
        llm.queue_turn("treatment_prescription", "Antibiotics? I don't think so.");
        llm.queue_turn("treatment_prescription", "That sounds sensible, thank you.");
        let (mut runtime, _rx) = cold_runtime(llm.clone());

        let out = runtime.process_turn("Hello").await.unwrap();
        assert_eq!(out.stage, Stage::Greeting);
        assert!(out.revealed_symptoms.is_empty());
        assert!(!out.conversation_complete);

        let out = runtime.process_turn("How are you feeling?").await.unwrap();
        assert_eq!(out.stage, Stage::SymptomInquiry);
        assert_eq!(out.revealed_symptoms, vec!["runny nose", "sore throat"]);
        assert_eq!(out.reply_text, "Not great, honestly.");

        let out = runtime
            .process_turn("Tell me more about your symptoms")
            .await
            .unwrap();
        assert_eq!(out.revealed_symptoms, COLD_SYMPTOMS.to_vec());

        let out = runtime
            .process_turn("I prescribe antibiotics")
            .await
            .unwrap();
        assert_eq!(out.stage, Stage::TreatmentPrescription);
        assert!(!out.accepted);
        assert!(!out.conversation_complete);

        let out = runtime
            .process_turn("What about rest and fluids?")
            .await
            .unwrap();
        assert!(out.accepted);
        assert!(out.conversation_complete);

        let patient = runtime.patient();
        assert_eq!(patient.history.len(), 10);
        assert_eq!(patient.revealed_symptoms.len(), 4);
        assert_eq!(runtime.phase(), &TurnPhase::Idle);
        assert_eq!(llm.recorded_prompts().len(), 5);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_turn_logs_transcript() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_turn("greeting", "Hi doctor.");
        let (mut runtime, _rx) = cold_runtime(llm);
        runtime.process_turn("Hello there").await.unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let doctor = output
            .lines()
            .find(|line| line.contains("Doctor says"))
            .expect("doctor line logged");
        assert!(doctor.contains(r#""conv_id":"test-conv""#));
        assert!(doctor.contains(r#""text":"Hello there""#));
        let patient = output
            .lines()
            .find(|line| line.contains("Patient says"))
            .expect("patient line logged");
        assert!(patient.contains(r#""text":"Hi doctor.""#));
        assert!(patient.contains(r#""stage":"greeting""#));
        assert!(patient.contains(r#""accepted":false"#));
    }

    #[tokio::test]
    async fn test_reply_sees_doctor_line_and_projected_state() {
        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_turn("symptom_inquiry", "My nose won't stop running.");
        let (mut runtime, _rx) = cold_runtime(llm.clone());

        runtime.process_turn("What are your symptoms?").await.unwrap();

        let completions = llm.recorded_completions();
        assert_eq!(completions.len(), 1);
        let (instruction, history) = &completions[0];
        assert_eq!(history, &vec![Turn::doctor("What are your symptoms?")]);
        // The instruction is built from state as it will be after the turn
        assert!(instruction.contains("runny nose"));
        assert!(instruction.contains("sore throat"));
    }

    #[tokio::test]
    async fn test_unknown_condition_never_accepts() {
        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_turn("treatment_prescription", "Okay.");
        llm.queue_turn("treatment_prescription", "Okay.");
        let patient = PatientState::new("lupus", vec!["joint pain".to_string()]);
        let (mut runtime, _rx) = runtime_for(llm, patient, None);

        for message in ["Get some rest and fluids", "Take antibiotics"] {
            let out = runtime.process_turn(message).await.unwrap();
            assert!(!out.accepted);
            assert!(!out.conversation_complete);
        }
    }

    #[tokio::test]
    async fn test_inquiry_without_probe_reveals_nothing() {
        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_turn("symptom_inquiry", "Sure.");
        let (mut runtime, _rx) = cold_runtime(llm);

        let out = runtime
            .process_turn("Let's go over your medical history")
            .await
            .unwrap();
        assert_eq!(out.stage, Stage::SymptomInquiry);
        assert!(out.revealed_symptoms.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_label_falls_back_to_general_question() {
        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_turn("  farewell\n", "Bye then.");
        let (mut runtime, _rx) = cold_runtime(llm);

        let out = runtime.process_turn("See you around").await.unwrap();
        assert_eq!(out.stage, Stage::GeneralQuestion);
    }

    #[tokio::test]
    async fn test_reply_failure_leaves_state_untouched() {
        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_label("symptom_inquiry");
        llm.queue_reply_error(LlmError::server_error("overloaded"));
        let (mut runtime, mut rx) = cold_runtime(llm.clone());

        let err = runtime
            .process_turn("How are you feeling?")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TurnError::Generation {
                kind: LlmErrorKind::ServerError,
                ..
            }
        ));

        let patient = runtime.patient();
        assert!(patient.revealed_symptoms.is_empty());
        assert_eq!(patient.stage, Stage::Greeting);
        assert!(!patient.accepted);
        assert_eq!(patient.history, vec![Turn::doctor("How are you feeling?")]);
        assert!(matches!(runtime.phase(), TurnPhase::Failed { .. }));
        assert!(matches!(rx.try_recv(), Ok(SseEvent::Error { .. })));

        // Resubmitting reuses the unanswered doctor line
        llm.queue_turn("symptom_inquiry", "Pretty stuffy.");
        let out = runtime.process_turn("How are you feeling?").await.unwrap();
        assert_eq!(out.revealed_symptoms, vec!["runny nose", "sore throat"]);
        let history = &runtime.patient().history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::Doctor);
        assert_eq!(history[1].role, Role::Patient);
    }

    #[tokio::test]
    async fn test_classifier_timeout_maps_to_timeout() {
        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_label_error(LlmError::timeout("slow"));
        let (mut runtime, _rx) = cold_runtime(llm.clone());

        let err = runtime.process_turn("Hello").await.unwrap_err();
        assert!(matches!(err, TurnError::Timeout(_)));
        // The reply was never requested
        assert!(llm.recorded_completions().is_empty());
    }

    #[tokio::test]
    async fn test_call_exceeding_deadline_times_out() {
        let llm = Arc::new(GatedTextGenerator::new());
        let (tx, _rx) = broadcast::channel(8);
        let mut runtime = PatientRuntime::new(
            ConvContext::new("slow-conv", Catalog::builtin().get("common cold")),
            cold_patient(),
            llm,
            tx,
            CancellationToken::new(),
            Duration::from_millis(20),
        );

        let err = runtime.process_turn("Hello").await.unwrap_err();
        assert!(matches!(err, TurnError::Timeout(_)));
        assert_eq!(runtime.patient().history.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let llm = Arc::new(MockTextGenerator::new());
        let (mut runtime, _rx) = cold_runtime(llm.clone());

        let err = runtime.process_turn("   ").await.unwrap_err();
        assert!(matches!(err, TurnError::Transition(_)));
        assert!(runtime.patient().history.is_empty());
        assert!(llm.recorded_prompts().is_empty());
    }

    // ------------------------------------------------------------------------
    // Manager
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_conversation() {
        let manager = manager_with(Arc::new(MockTextGenerator::new()));

        let started = manager
            .start_conversation("dr-1", Some("common cold"))
            .await
            .unwrap();
        assert_eq!(started.condition, "common cold");
        assert_eq!(started.symptom_count, 4);
        assert!(started.conversation_id.starts_with("patient_"));

        let random = manager.start_conversation("dr-1", None).await.unwrap();
        assert!(manager.catalog().get(&random.condition).is_some());

        let err = manager
            .start_conversation("dr-1", Some("lupus"))
            .await
            .unwrap_err();
        assert_eq!(err, StartError::UnknownCondition("lupus".to_string()));
    }

    #[tokio::test]
    async fn test_start_with_empty_catalog() {
        let manager = ConversationManager::new(
            Arc::new(Catalog::from_entries(Vec::<ConditionEntry>::new())),
            Arc::new(MockTextGenerator::new()),
            RuntimeConfig::default(),
        );
        let err = manager.start_conversation("dr-1", None).await.unwrap_err();
        assert_eq!(err, StartError::EmptyCatalog);
    }

    #[tokio::test]
    async fn test_process_turn_through_manager() {
        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_turn("symptom_inquiry", "I keep sneezing.");
        let manager = manager_with(llm);
        let id = manager
            .start_conversation("dr-1", Some("common cold"))
            .await
            .unwrap()
            .conversation_id;

        let out = manager
            .process_turn(&id, "What's wrong today?")
            .await
            .unwrap();
        assert_eq!(out.revealed_symptoms, vec!["runny nose", "sore throat"]);

        let patients = manager.list_patients("dr-1").await;
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].patient_id, id);
        assert_eq!(patients[0].stage, Stage::SymptomInquiry);
        assert_eq!(patients[0].revealed_symptoms.len(), 2);
    }

    #[tokio::test]
    async fn test_list_patients_filters_by_doctor() {
        let manager = manager_with(Arc::new(MockTextGenerator::new()));
        manager.start_conversation("dr-1", None).await.unwrap();
        manager.start_conversation("dr-1", None).await.unwrap();
        manager.start_conversation("dr-2", None).await.unwrap();

        assert_eq!(manager.list_patients("dr-1").await.len(), 2);
        assert_eq!(manager.list_patients("dr-2").await.len(), 1);
        assert!(manager.list_patients("dr-3").await.is_empty());
    }

    #[tokio::test]
    async fn test_second_message_while_busy_is_rejected() {
        let llm = Arc::new(GatedTextGenerator::new());
        llm.inner.queue_turn("greeting", "Hello.");
        let manager = manager_with(llm.clone());
        let id = manager
            .start_conversation("dr-1", Some("common cold"))
            .await
            .unwrap()
            .conversation_id;

        let first = {
            let manager = manager.clone();
            let id = id.clone();
            tokio::spawn(async move { manager.process_turn(&id, "Hi there").await })
        };
        llm.wait_entered().await;

        let err = manager.process_turn(&id, "Are you there?").await.unwrap_err();
        assert!(matches!(err, TurnError::Busy));

        // The listing still answers while the turn is in flight
        let patients = manager.list_patients("dr-1").await;
        assert_eq!(patients[0].stage, Stage::Greeting);

        llm.release();
        let out = first.await.unwrap().unwrap();
        assert_eq!(out.reply_text, "Hello.");
        assert_eq!(llm.inner.recorded_prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_end_conversation_cancels_in_flight_turn() {
        let llm = Arc::new(GatedTextGenerator::new());
        let manager = manager_with(llm.clone());
        let id = manager
            .start_conversation("dr-1", Some("common cold"))
            .await
            .unwrap()
            .conversation_id;

        let turn = {
            let manager = manager.clone();
            let id = id.clone();
            tokio::spawn(async move { manager.process_turn(&id, "Hello").await })
        };
        llm.wait_entered().await;

        assert!(manager.end_conversation(&id).await);
        let err = turn.await.unwrap().unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));

        let err = manager.process_turn(&id, "Hello?").await.unwrap_err();
        assert!(matches!(err, TurnError::NotFound(_)));
        // Idempotent
        assert!(!manager.end_conversation(&id).await);
        assert!(manager.list_patients("dr-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_wedge_conversation() {
        let llm = Arc::new(GatedTextGenerator::new());
        llm.inner.queue_label_error(LlmError::network("connection reset"));
        let manager = manager_with(llm.clone());
        let id = manager
            .start_conversation("dr-1", Some("common cold"))
            .await
            .unwrap()
            .conversation_id;
        let (_, mut rx) = manager.subscribe(&id).await.unwrap();

        let turn = {
            let manager = manager.clone();
            let id = id.clone();
            tokio::spawn(async move { manager.process_turn(&id, "Hello").await })
        };
        llm.wait_entered().await;

        // The client goes away mid-classification
        turn.abort();
        assert!(turn.await.unwrap_err().is_cancelled());

        // The abandoned turn still runs to a settled failure
        llm.release();
        assert!(matches!(rx.recv().await.unwrap(), SseEvent::Error { .. }));

        llm.inner.queue_turn("greeting", "Hi doc.");
        llm.release();
        let out = loop {
            match manager.process_turn(&id, "Hello").await {
                Err(TurnError::Busy) => tokio::time::sleep(Duration::from_millis(5)).await,
                other => break other,
            }
        }
        .unwrap();
        assert_eq!(out.reply_text, "Hi doc.");
        assert_eq!(out.stage, Stage::Greeting);

        let (init, _) = manager.subscribe(&id).await.unwrap();
        match init {
            SseEvent::Init { history, .. } => {
                assert_eq!(history, vec![Turn::doctor("Hello"), Turn::patient("Hi doc.")]);
            }
            other => panic!("expected init, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscribe_receives_turn_events() {
        let llm = Arc::new(MockTextGenerator::new());
        llm.queue_turn("treatment_prescription", "I'll rest up, thanks.");
        let manager = manager_with(llm);
        let id = manager
            .start_conversation("dr-1", Some("common cold"))
            .await
            .unwrap()
            .conversation_id;

        let (init, mut rx) = manager.subscribe(&id).await.unwrap();
        match init {
            SseEvent::Init { patient, history } => {
                assert_eq!(patient.condition, "common cold");
                assert!(history.is_empty());
            }
            other => panic!("expected init, got {other:?}"),
        }

        manager
            .process_turn(&id, "Plenty of rest and fluids")
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            SseEvent::PatientResponse { accepted: true, .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SseEvent::ConversationComplete
        ));

        assert!(matches!(
            manager.subscribe("missing").await,
            Err(TurnError::NotFound(_))
        ));
    }

    // ------------------------------------------------------------------------
    // Registry adapter
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_registry_generator_routes_models() {
        let patient = Arc::new(MockLlmService::new("patient-model"));
        let classifier = Arc::new(MockLlmService::new("classifier-model"));
        patient.queue_text("I have a headache.");
        classifier.queue_text("symptom_inquiry");
        let registry = ModelRegistry::with_services(
            vec![patient.clone() as Arc<dyn LlmService>, classifier.clone()],
            "patient-model",
            "classifier-model",
        );
        let generator = RegistryTextGenerator::new(Arc::new(registry));

        let label = generator.classify("label this").await.unwrap();
        assert_eq!(label, "symptom_inquiry");

        let history = vec![
            Turn::doctor("Hello"),
            Turn::patient("Hi"),
            Turn::doctor("What hurts?"),
        ];
        let reply = generator.complete("be a patient", &history).await.unwrap();
        assert_eq!(reply, "I have a headache.");

        let requests = patient.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system[0].text, "be a patient");
        let roles: Vec<_> = requests[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
        assert_eq!(classifier.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_system_lines_join_the_instruction() {
        let patient = Arc::new(MockLlmService::new("m"));
        patient.queue_text("Okay.");
        let registry =
            ModelRegistry::with_services(vec![patient.clone() as Arc<dyn LlmService>], "m", "m");
        let generator = RegistryTextGenerator::new(Arc::new(registry));

        let history = vec![
            Turn::doctor("Hello"),
            Turn {
                role: Role::System,
                text: "The patient is anxious".to_string(),
            },
            Turn::patient("Hi"),
        ];
        generator.complete("be a patient", &history).await.unwrap();

        let request = &patient.recorded_requests()[0];
        let system: Vec<_> = request.system.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(system, vec!["be a patient", "The patient is anxious"]);
        let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
    }

    #[tokio::test]
    async fn test_registry_generator_retries_transient_errors() {
        let service = Arc::new(MockLlmService::new("m"));
        service.queue_error(
            LlmError::rate_limit("slow down").with_retry_after(Duration::from_millis(5)),
        );
        service.queue_text("greeting");
        let registry =
            ModelRegistry::with_services(vec![service.clone() as Arc<dyn LlmService>], "m", "m");
        let generator = RegistryTextGenerator::new(Arc::new(registry));

        assert_eq!(generator.classify("hi").await.unwrap(), "greeting");
        assert_eq!(service.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_registry_generator_does_not_retry_auth() {
        let service = Arc::new(MockLlmService::new("m"));
        service.queue_error(LlmError::auth("bad key"));
        service.queue_text("never used");
        let registry =
            ModelRegistry::with_services(vec![service.clone() as Arc<dyn LlmService>], "m", "m");
        let generator = RegistryTextGenerator::new(Arc::new(registry));

        let err = generator.complete("be a patient", &[]).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Auth);
        assert_eq!(service.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_registry_generator_without_models() {
        let generator = RegistryTextGenerator::new(Arc::new(ModelRegistry::new_empty()));
        let err = generator.classify("anything").await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Network);
    }
}
