//! `configure_llm_provider`.

use crate::context::AppContext;
use crate::dto::{parse_input, to_json};
use crate::registry::{BoxFuture, ToolDyn};
use chronicle_types::{ProviderConfig, ProviderId, ProviderKind};
use serde::Deserialize;
use serde_json::{json, Value as Json};

/// Create, update, or toggle an LLM/embedding provider configuration.
pub struct ConfigureLlmProvider {
    ctx: AppContext,
}

impl ConfigureLlmProvider {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct ConfigureLlmProviderInput {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    api_key_env: Option<String>,
    #[serde(default)]
    model_name: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    cost_per_1k_tokens: Option<f64>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    metadata: Option<Json>,
}

impl ToolDyn for ConfigureLlmProvider {
    fn name(&self) -> &str {
        "configure_llm_provider"
    }

    fn description(&self) -> &str {
        "Create a new LLM/embedding provider configuration, or update and activate an existing one by id"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "kind": {"type": "string", "enum": ["local", "external"]},
                "endpoint": {"type": "string"},
                "api_key_env": {"type": "string"},
                "model_name": {"type": "string"},
                "max_tokens": {"type": "integer"},
                "temperature": {"type": "number"},
                "priority": {"type": "integer"},
                "cost_per_1k_tokens": {"type": "number"},
                "is_active": {"type": "boolean"},
                "metadata": {"type": "object"}
            }
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: ConfigureLlmProviderInput = parse_input(input)?;

            let provider = match req.id {
                Some(id) if !id.is_empty() => {
                    let provider_id = ProviderId::new(id);
                    let updated = ctx
                        .repos
                        .providers
                        .update_config(&provider_id, req.endpoint, req.model_name, req.max_tokens, req.temperature, req.priority)
                        .await?;
                    if let Some(active) = req.is_active {
                        ctx.repos.providers.set_active(&provider_id, active).await?;
                        ctx.repos.providers.find_by_id(&provider_id).await?
                    } else {
                        updated
                    }
                }
                _ => {
                    let kind = match req.kind.as_deref() {
                        Some("external") => ProviderKind::External,
                        _ => ProviderKind::Local,
                    };
                    let provider = ProviderConfig {
                        id: ProviderId::new(""),
                        name: req.name.unwrap_or_else(|| "unnamed provider".to_string()),
                        kind,
                        endpoint: req.endpoint,
                        api_key_env: req.api_key_env,
                        model_name: req.model_name.unwrap_or_else(|| "builtin-embed-v1".to_string()),
                        max_tokens: req.max_tokens.unwrap_or(4096),
                        temperature: req.temperature.unwrap_or(0.2),
                        is_active: req.is_active.unwrap_or(true),
                        priority: req.priority.unwrap_or(0),
                        cost_per_1k_tokens: req.cost_per_1k_tokens.unwrap_or(0.0),
                        metadata: req.metadata.unwrap_or_else(|| json!({})),
                    };
                    ctx.repos.providers.create(provider).await?
                }
            };

            Ok(json!({ "provider": to_json(&provider)? }))
        })
    }
}
