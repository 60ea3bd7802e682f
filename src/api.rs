//! HTTP API for the patient simulator

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::llm::ModelRegistry;
use crate::runtime::ConversationManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConversationManager>,
    pub llm_registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(manager: Arc<ConversationManager>, llm_registry: Arc<ModelRegistry>) -> Self {
        Self {
            manager,
            llm_registry,
        }
    }
}
