//! `get_proactive_insights`, `check_for_conflicts` (an `InsightRepository`
//! plus a cross-table aggregate query no single repository method
//! covers).

use crate::context::AppContext;
use crate::dto::{parse_input, to_json};
use crate::registry::{BoxFuture, ToolDyn};
use chronicle_store::from_rusqlite;
use chronicle_types::ConversationId;
use rusqlite::params;
use serde::Deserialize;
use serde_json::{json, Value as Json};

/// Surface previously recorded proactive insights.
pub struct GetProactiveInsights {
    ctx: AppContext,
}

impl GetProactiveInsights {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GetProactiveInsightsInput {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
}

impl ToolDyn for GetProactiveInsights {
    fn name(&self) -> &str {
        "get_proactive_insights"
    }

    fn description(&self) -> &str {
        "Fetch previously recorded proactive insights, optionally scoped to one conversation"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"},
                "limit": {"type": "integer"}
            }
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: GetProactiveInsightsInput = parse_input(input)?;
            let cid = req.conversation_id.map(ConversationId::new);
            let insights = ctx.repos.insights.list_for(cid.as_ref(), req.limit.unwrap_or(20)).await?;
            Ok(json!({ "insights": to_json(&insights)? }))
        })
    }
}

/// Detect entity pairs mentioned in a conversation that are linked by
/// more than one relationship type, a likely sign of conflicting or
/// stale information.
pub struct CheckForConflicts {
    ctx: AppContext,
}

impl CheckForConflicts {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct CheckForConflictsInput {
    conversation_id: String,
}

impl ToolDyn for CheckForConflicts {
    fn name(&self) -> &str {
        "check_for_conflicts"
    }

    fn description(&self) -> &str {
        "Detect entity pairs mentioned in a conversation that are linked by more than one relationship type"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"}
            },
            "required": ["conversation_id"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: CheckForConflictsInput = parse_input(input)?;
            let conversation_id = req.conversation_id;

            let rows = ctx
                .pool
                .with_connection(None, move |store| {
                    let conn = store.conn();
                    let mut stmt = conn
                        .prepare(
                            "SELECT er.source_entity_id, er.target_entity_id, GROUP_CONCAT(DISTINCT er.relationship_type) AS types
                             FROM entity_relationships er
                             WHERE er.source_entity_id IN (
                                 SELECT DISTINCT em.entity_id FROM entity_mentions em
                                 JOIN messages m ON m.id = em.message_id WHERE m.conversation_id = ?1
                             ) AND er.target_entity_id IN (
                                 SELECT DISTINCT em.entity_id FROM entity_mentions em
                                 JOIN messages m ON m.id = em.message_id WHERE m.conversation_id = ?1
                             )
                             GROUP BY er.source_entity_id, er.target_entity_id
                             HAVING COUNT(DISTINCT er.relationship_type) > 1",
                        )
                        .map_err(from_rusqlite)?;
                    let rows = stmt
                        .query_map(params![conversation_id], |row| {
                            let source: String = row.get(0)?;
                            let target: String = row.get(1)?;
                            let types: String = row.get(2)?;
                            Ok((source, target, types))
                        })
                        .map_err(from_rusqlite)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
                })
                .await?;

            let conflicts: Vec<Json> = rows
                .into_iter()
                .map(|(source, target, types)| {
                    json!({
                        "source_entity_id": source,
                        "target_entity_id": target,
                        "relationship_types": types.split(',').collect::<Vec<_>>(),
                    })
                })
                .collect();
            Ok(json!({ "conflicts": conflicts }))
        })
    }
}
