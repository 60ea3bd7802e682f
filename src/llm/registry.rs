//! Model registry for managing available LLM providers

use super::{all_models, LlmService, TracedService};
use std::collections::HashMap;
use std::sync::Arc;

/// Model used when nothing is configured
pub const DEFAULT_MODEL: &str = "claude-4.5-haiku";

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    /// Gateway base URL; when set, requests go through it without a real key
    pub gateway: Option<String>,
    /// Model that writes the patient's replies
    pub patient_model: Option<String>,
    /// Model that labels doctor intent; defaults to the patient model
    pub classifier_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            patient_model: std::env::var("PATIENT_MODEL").ok(),
            classifier_model: std::env::var("CLASSIFIER_MODEL").ok(),
        }
    }
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    patient_model: String,
    classifier_model: String,
}

impl ModelRegistry {
    /// Create an empty registry for testing purposes
    #[cfg(test)]
    pub fn new_empty() -> Self {
        Self {
            services: HashMap::new(),
            patient_model: "test-model".to_string(),
            classifier_model: "test-model".to_string(),
        }
    }

    /// Registry with explicit services, for tests
    #[cfg(test)]
    pub fn with_services(
        services: Vec<Arc<dyn LlmService>>,
        patient_model: &str,
        classifier_model: &str,
    ) -> Self {
        Self {
            services: services
                .into_iter()
                .map(|s| (s.model_id().to_string(), s))
                .collect(),
            patient_model: patient_model.to_string(),
            classifier_model: classifier_model.to_string(),
        }
    }

    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        for model_def in all_models() {
            if let Some(service) = Self::try_create_model(model_def, config) {
                services.insert(model_def.id.to_string(), service);
            }
        }

        let patient_model = config
            .patient_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let classifier_model = config
            .classifier_model
            .clone()
            .unwrap_or_else(|| patient_model.clone());

        Self {
            services,
            patient_model,
            classifier_model,
        }
    }

    /// Try to create a model service, validating prerequisites
    fn try_create_model(
        model_def: &super::ModelDef,
        config: &LlmConfig,
    ) -> Option<Arc<dyn LlmService>> {
        // In gateway mode the gateway handles authentication
        let api_key = if config.gateway.is_some() {
            "implicit".to_string()
        } else {
            config.anthropic_api_key.clone()?
        };

        match (model_def.factory)(&api_key, config.gateway.as_deref()) {
            Ok(service) => Some(Arc::new(TracedService::new(service))),
            Err(e) => {
                tracing::debug!(model = model_def.id, error = %e, "Model unavailable");
                None
            }
        }
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Service for patient replies
    pub fn patient(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.patient_model)
    }

    /// Service for intent classification, falling back to the patient model
    pub fn classifier(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.classifier_model).or_else(|| self.patient())
    }

    pub fn patient_model_id(&self) -> &str {
        &self.patient_model
    }

    pub fn classifier_model_id(&self) -> &str {
        &self.classifier_model
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    /// Metadata for every model that is available
    pub fn available_model_info(&self) -> Vec<crate::api::ModelInfo> {
        all_models()
            .iter()
            .filter(|def| self.services.contains_key(def.id))
            .map(|def| crate::api::ModelInfo {
                id: def.id.to_string(),
                description: def.description.to_string(),
            })
            .collect()
    }
}
