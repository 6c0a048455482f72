//! Model router — selects the model backend based on config.

use std::collections::HashMap;
use std::sync::Arc;

use stringer_core::error::ModelError;
use stringer_core::model::ModelClient;

use crate::openai::OpenAiCompatModel;

/// Routes model requests to the configured backend.
pub struct ModelRouter {
    backends: HashMap<String, Arc<dyn ModelClient>>,
    default_backend: String,
}

impl ModelRouter {
    /// Create a new router with a default backend name.
    pub fn new(default_backend: impl Into<String>) -> Self {
        Self {
            backends: HashMap::new(),
            default_backend: default_backend.into(),
        }
    }

    /// Register a backend.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn ModelClient>) {
        self.backends.insert(name.into(), backend);
    }

    /// Get the default backend.
    pub fn default(&self) -> Option<Arc<dyn ModelClient>> {
        self.backends.get(&self.default_backend).cloned()
    }

    /// Get a specific backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelClient>> {
        self.backends.get(name).cloned()
    }

    /// List all registered backend names.
    pub fn list(&self) -> Vec<&str> {
        self.backends.keys().map(|s| s.as_str()).collect()
    }
}

/// Build the router from configuration.
pub fn build_from_config(config: &stringer_config::AppConfig) -> Result<ModelRouter, ModelError> {
    let mut router = ModelRouter::new("openai");

    let api_key = config.api_key.clone().unwrap_or_default();
    let backend = OpenAiCompatModel::new("openai", &config.model_base_url, api_key)?;
    router.register("openai", Arc::new(backend));

    Ok(router)
}
