//! `ProviderConfigRepository`.

use crate::util::json_from_text;
use chronicle_store::{from_rusqlite, ConnectionPool, QueryCache};
use chronicle_types::{ChronicleError, ProviderConfig, ProviderId, ProviderKind};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

/// Typed access to the `llm_providers` table.
pub struct ProviderConfigRepository {
    pool: ConnectionPool,
    cache: Arc<QueryCache>,
}

impl ProviderConfigRepository {
    /// Build a repository over a shared pool and cache.
    pub fn new(pool: ConnectionPool, cache: Arc<QueryCache>) -> Self {
        Self { pool, cache }
    }

    fn row_to_provider(row: &Row<'_>) -> rusqlite::Result<ProviderConfig> {
        let id: String = row.get("id")?;
        let kind_text: String = row.get("kind")?;
        let metadata_text: String = row.get("metadata")?;
        Ok(ProviderConfig {
            id: ProviderId::new(id),
            name: row.get("name")?,
            kind: if kind_text == "external" { ProviderKind::External } else { ProviderKind::Local },
            endpoint: row.get("endpoint")?,
            api_key_env: row.get("api_key_env")?,
            model_name: row.get("model_name")?,
            max_tokens: row.get("max_tokens")?,
            temperature: row.get("temperature")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            priority: row.get("priority")?,
            cost_per_1k_tokens: row.get("cost_per_1k_tokens")?,
            metadata: json_from_text(&metadata_text),
        })
    }

    /// Register a provider configuration, generating an id if one was
    /// not supplied.
    pub async fn create(&self, mut provider: ProviderConfig) -> Result<ProviderConfig, ChronicleError> {
        if !(0.0..=2.0).contains(&provider.temperature) {
            return Err(ChronicleError::validation_field("temperature", "must be between 0 and 2"));
        }
        if provider.max_tokens == 0 {
            return Err(ChronicleError::validation_field("max_tokens", "must be greater than zero"));
        }
        if provider.id.as_str().is_empty() {
            provider.id = ProviderId::generate();
        }

        let kind_text = if provider.kind == ProviderKind::External { "external" } else { "local" };
        let metadata_text = crate::util::json_to_text(&provider.metadata);
        let to_insert = provider.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO llm_providers
                            (id, name, kind, endpoint, api_key_env, model_name, max_tokens, temperature,
                             is_active, priority, cost_per_1k_tokens, metadata)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                        params![
                            to_insert.id.as_str(),
                            to_insert.name,
                            kind_text,
                            to_insert.endpoint,
                            to_insert.api_key_env,
                            to_insert.model_name,
                            to_insert.max_tokens,
                            to_insert.temperature,
                            to_insert.is_active as i64,
                            to_insert.priority,
                            to_insert.cost_per_1k_tokens,
                            metadata_text,
                        ],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;

        self.cache.invalidate("providers").await;
        Ok(provider)
    }

    /// Fetch a provider configuration by id.
    pub async fn find_by_id(&self, id: &ProviderId) -> Result<ProviderConfig, ChronicleError> {
        let id = id.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .query_row(
                        "SELECT id, name, kind, endpoint, api_key_env, model_name, max_tokens, temperature,
                                is_active, priority, cost_per_1k_tokens, metadata
                         FROM llm_providers WHERE id = ?1",
                        params![id.as_str()],
                        Self::row_to_provider,
                    )
                    .optional()
                    .map_err(from_rusqlite)?
                    .ok_or_else(|| ChronicleError::NotFound(format!("provider {id} not found")))
            })
            .await
    }

    /// Active providers, highest priority first, for use by callers
    /// picking an LLM/embedding backend.
    pub async fn list_active(&self) -> Result<Vec<ProviderConfig>, ChronicleError> {
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn
                    .prepare(
                        "SELECT id, name, kind, endpoint, api_key_env, model_name, max_tokens, temperature,
                                is_active, priority, cost_per_1k_tokens, metadata
                         FROM llm_providers WHERE is_active = 1 ORDER BY priority DESC",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt.query_map([], Self::row_to_provider).map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
            })
            .await
    }

    /// List every configured provider, active or not.
    pub async fn list_all(&self) -> Result<Vec<ProviderConfig>, ChronicleError> {
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn
                    .prepare(
                        "SELECT id, name, kind, endpoint, api_key_env, model_name, max_tokens, temperature,
                                is_active, priority, cost_per_1k_tokens, metadata
                         FROM llm_providers ORDER BY priority DESC",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt.query_map([], Self::row_to_provider).map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
            })
            .await
    }

    /// Toggle a provider's `is_active` flag.
    pub async fn set_active(&self, id: &ProviderId, active: bool) -> Result<(), ChronicleError> {
        let id = id.clone();
        let affected = self
            .pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "UPDATE llm_providers SET is_active = ?1 WHERE id = ?2",
                        params![active as i64, id.as_str()],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        if affected == 0 {
            return Err(ChronicleError::NotFound(format!("provider {id} not found")));
        }
        self.cache.invalidate("providers").await;
        Ok(())
    }

    /// Update the mutable configuration fields of a provider in place.
    pub async fn update_config(
        &self,
        id: &ProviderId,
        endpoint: Option<String>,
        model_name: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f64>,
        priority: Option<i32>,
    ) -> Result<ProviderConfig, ChronicleError> {
        let existing = self.find_by_id(id).await?;
        let endpoint = endpoint.or(existing.endpoint);
        let model_name = model_name.unwrap_or(existing.model_name);
        let max_tokens = max_tokens.unwrap_or(existing.max_tokens);
        let temperature = temperature.unwrap_or(existing.temperature);
        let priority = priority.unwrap_or(existing.priority);
        if max_tokens == 0 {
            return Err(ChronicleError::validation_field("max_tokens", "must be greater than zero"));
        }

        let id = id.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "UPDATE llm_providers SET endpoint = ?1, model_name = ?2, max_tokens = ?3, temperature = ?4, priority = ?5
                         WHERE id = ?6",
                        params![endpoint, model_name, max_tokens, temperature, priority, id.as_str()],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        self.cache.invalidate("providers").await;
        self.find_by_id(&id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, priority: i32, active: bool) -> ProviderConfig {
        ProviderConfig {
            id: ProviderId::new(id),
            name: format!("provider-{id}"),
            kind: ProviderKind::Local,
            endpoint: None,
            api_key_env: None,
            model_name: "local-embedder-v1".into(),
            max_tokens: 2048,
            temperature: 0.2,
            is_active: active,
            priority,
            cost_per_1k_tokens: 0.0,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let cache = Arc::new(QueryCache::new());
        let repo = ProviderConfigRepository::new(pool, cache);
        let created = repo.create(sample("p1", 10, true)).await.unwrap();
        let found = repo.find_by_id(&created.id).await.unwrap();
        assert_eq!(found.name, "provider-p1");
    }

    #[tokio::test]
    async fn list_active_orders_by_descending_priority() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let cache = Arc::new(QueryCache::new());
        let repo = ProviderConfigRepository::new(pool, cache);
        repo.create(sample("low", 1, true)).await.unwrap();
        repo.create(sample("high", 99, true)).await.unwrap();
        repo.create(sample("inactive", 50, false)).await.unwrap();

        let active = repo.list_active().await.unwrap();
        let ids: Vec<&str> = active.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn zero_max_tokens_is_rejected() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let cache = Arc::new(QueryCache::new());
        let repo = ProviderConfigRepository::new(pool, cache);
        let mut bad = sample("bad", 1, true);
        bad.max_tokens = 0;
        assert!(repo.create(bad).await.is_err());
    }
}
