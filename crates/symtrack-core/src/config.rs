use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use symtrack_provider::{register_from_configs, LlmRouter, ProviderConfig, ProviderRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPolicy {
    /// `provider/model` reference tried first.
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

fn default_database_path() -> String {
    "symtrack.db".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub model_policy: ModelPolicy,
    #[serde(default)]
    pub global_fallbacks: Vec<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    pub fn build_router(&self) -> Result<Arc<LlmRouter>> {
        let mut registry = ProviderRegistry::new();
        register_from_configs(&mut registry, &self.providers)?;
        Ok(Arc::new(LlmRouter::new(
            registry,
            self.global_fallbacks.clone(),
        )))
    }
}
