//! Gateway registry.
//!
//! An explicit object mapping configuration name to a cached gateway,
//! passed by reference to the components that need one. The cached
//! instance (and its token budget) persists across orchestration runs
//! under the same configuration name.

use crate::error::{ResearchError, Result};
use crate::llm::{LlmGateway, LlmSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_CONFIG: &str = "default";

pub struct GatewayRegistry {
    settings: HashMap<String, LlmSettings>,
    gateways: RwLock<HashMap<String, Arc<LlmGateway>>>,
}

impl GatewayRegistry {
    pub fn new(default_settings: LlmSettings) -> Self {
        let mut settings = HashMap::new();
        settings.insert(DEFAULT_CONFIG.to_string(), default_settings);
        Self {
            settings,
            gateways: RwLock::new(HashMap::new()),
        }
    }

    /// Register a named configuration. Gateways already created keep their
    /// settings; registration only affects future creation.
    pub fn register(&mut self, name: impl Into<String>, settings: LlmSettings) {
        self.settings.insert(name.into(), settings);
    }

    /// The gateway for a configuration name, created on first use. Unknown
    /// names fall back to the default configuration's settings.
    pub async fn get_or_create(&self, name: &str) -> Result<Arc<LlmGateway>> {
        {
            let gateways = self.gateways.read().await;
            if let Some(gateway) = gateways.get(name) {
                return Ok(gateway.clone());
            }
        }

        let settings = self
            .settings
            .get(name)
            .or_else(|| self.settings.get(DEFAULT_CONFIG))
            .cloned()
            .ok_or_else(|| {
                ResearchError::Validation(format!("No LLM settings registered for '{}'", name))
            })?;

        let mut gateways = self.gateways.write().await;
        // A concurrent caller may have created it between the two locks.
        let gateway = gateways
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(config = name, "Creating gateway");
                Arc::new(LlmGateway::new(settings))
            })
            .clone();

        Ok(gateway)
    }
}
