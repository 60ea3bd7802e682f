//! Events that can occur in a conversation

use crate::llm::LlmErrorKind;
use crate::state_machine::state::Stage;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Doctor events
    DoctorMessage {
        text: String,
    },

    // Capability events
    StageClassified {
        stage: Stage,
    },
    ReplyGenerated {
        text: String,
    },
    LlmError {
        message: String,
        error_kind: LlmErrorKind,
    },
}
