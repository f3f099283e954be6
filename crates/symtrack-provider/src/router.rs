use anyhow::{anyhow, Result};

use crate::{LlmRequest, LlmResponse, ProviderRegistry};

/// Routes a chat request across a primary model and its fallbacks.
///
/// Model references use the `provider/model` form; the provider half is
/// resolved through the registry. The first candidate that answers wins.
pub struct LlmRouter {
    registry: ProviderRegistry,
    global_fallbacks: Vec<String>,
}

impl LlmRouter {
    pub fn new(registry: ProviderRegistry, global_fallbacks: Vec<String>) -> Self {
        Self {
            registry,
            global_fallbacks,
        }
    }

    pub async fn chat(
        &self,
        primary: &str,
        fallbacks: &[String],
        request_template: LlmRequest,
    ) -> Result<LlmResponse> {
        let mut candidates = vec![primary.to_string()];
        candidates.extend(fallbacks.iter().cloned());
        candidates.extend(self.global_fallbacks.clone());

        let mut last_err: Option<anyhow::Error> = None;

        for candidate in candidates {
            let (provider_id, model_id) = match parse_provider_model(&candidate) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!("invalid model reference {candidate}: {err}");
                    last_err = Some(err);
                    continue;
                }
            };
            let provider = match self.registry.get(&provider_id) {
                Ok(provider) => provider,
                Err(err) => {
                    tracing::warn!("provider {provider_id} unavailable: {err}");
                    last_err = Some(err);
                    continue;
                }
            };

            let mut req = request_template.clone();
            req.model = model_id;

            match provider.chat(req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    tracing::warn!("provider {provider_id} failed: {err}");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("no model candidate available")))
    }
}

fn parse_provider_model(input: &str) -> Result<(String, String)> {
    let (provider, model) = input
        .split_once('/')
        .ok_or_else(|| anyhow!("invalid model format (expected provider/model): {input}"))?;
    if provider.is_empty() || model.is_empty() {
        return Err(anyhow!("invalid model format: {input}"));
    }
    Ok((provider.to_string(), model.to_string()))
}
