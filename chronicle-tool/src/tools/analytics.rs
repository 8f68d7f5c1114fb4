//! `get_conversation_analytics`, `analyze_productivity_patterns`,
//! `detect_knowledge_gaps`, `track_decision_effectiveness`,
//! `generate_analytics_report`.

use crate::context::AppContext;
use crate::dto::{parse_input, to_json};
use crate::registry::{BoxFuture, ToolDyn};
use chronicle_types::{ChronicleError, ConversationId};
use serde::Deserialize;
use serde_json::{json, Value as Json};

/// Fetch recorded engagement/depth analytics snapshots for a conversation.
pub struct GetConversationAnalytics {
    ctx: AppContext,
}

impl GetConversationAnalytics {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GetConversationAnalyticsInput {
    conversation_id: String,
    #[serde(default)]
    limit: Option<u32>,
}

impl ToolDyn for GetConversationAnalytics {
    fn name(&self) -> &str {
        "get_conversation_analytics"
    }

    fn description(&self) -> &str {
        "Fetch recorded engagement/depth analytics snapshots for a conversation, most recent first"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["conversation_id"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: GetConversationAnalyticsInput = parse_input(input)?;
            let cid = ConversationId::new(req.conversation_id);
            let history = ctx.repos.conversation_analytics.history_for(&cid, req.limit.unwrap_or(20)).await?;
            Ok(json!({ "analytics": to_json(&history)? }))
        })
    }
}

/// Fetch recorded productivity windows overlapping a time range.
pub struct AnalyzeProductivityPatterns {
    ctx: AppContext,
}

impl AnalyzeProductivityPatterns {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct AnalyzeProductivityPatternsInput {
    start: i64,
    end: i64,
}

impl ToolDyn for AnalyzeProductivityPatterns {
    fn name(&self) -> &str {
        "analyze_productivity_patterns"
    }

    fn description(&self) -> &str {
        "Fetch recorded productivity windows overlapping a given time range"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "start": {"type": "integer"},
                "end": {"type": "integer"}
            },
            "required": ["start", "end"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: AnalyzeProductivityPatternsInput = parse_input(input)?;
            if req.end <= req.start {
                return Err(ChronicleError::validation_field("end", "must be greater than start"));
            }
            let patterns = ctx.repos.productivity_patterns.find_overlapping(req.start, req.end).await?;
            Ok(json!({ "patterns": to_json(&patterns)? }))
        })
    }
}

/// Fetch unresolved recurring topics, most frequent first.
pub struct DetectKnowledgeGaps {
    ctx: AppContext,
}

impl DetectKnowledgeGaps {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct DetectKnowledgeGapsInput {
    #[serde(default)]
    limit: Option<u32>,
}

impl ToolDyn for DetectKnowledgeGaps {
    fn name(&self) -> &str {
        "detect_knowledge_gaps"
    }

    fn description(&self) -> &str {
        "Fetch unresolved recurring knowledge gaps, most frequently observed first"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer"}
            }
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: DetectKnowledgeGapsInput = parse_input(input)?;
            let gaps = ctx.repos.knowledge_gaps.find_unresolved(req.limit.unwrap_or(20)).await?;
            Ok(json!({ "gaps": to_json(&gaps)? }))
        })
    }
}

/// Create a decision record, or advance one through implementation and
/// observed-outcome stages, or list a conversation's decisions.
pub struct TrackDecisionEffectiveness {
    ctx: AppContext,
}

impl TrackDecisionEffectiveness {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct TrackDecisionEffectivenessInput {
    action: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    decision_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    problem_identified_at: Option<i64>,
    #[serde(default)]
    decision_made_at: Option<i64>,
    #[serde(default)]
    options_considered: Vec<String>,
    #[serde(default)]
    at_ms: Option<i64>,
    #[serde(default)]
    effectiveness_score: Option<f64>,
}

impl ToolDyn for TrackDecisionEffectiveness {
    fn name(&self) -> &str {
        "track_decision_effectiveness"
    }

    fn description(&self) -> &str {
        "Create a decision record, advance it through implementation/outcome stages, or list a conversation's decisions"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "mark_implemented", "mark_outcome_observed", "list"]},
                "conversation_id": {"type": "string"},
                "decision_id": {"type": "string"},
                "description": {"type": "string"},
                "problem_identified_at": {"type": "integer"},
                "decision_made_at": {"type": "integer"},
                "options_considered": {"type": "array", "items": {"type": "string"}},
                "at_ms": {"type": "integer"},
                "effectiveness_score": {"type": "number"}
            },
            "required": ["action"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: TrackDecisionEffectivenessInput = parse_input(input)?;
            match req.action.as_str() {
                "create" => {
                    let conversation_id = req
                        .conversation_id
                        .ok_or_else(|| ChronicleError::validation_field("conversation_id", "required for action=create"))?;
                    let description = req
                        .description
                        .ok_or_else(|| ChronicleError::validation_field("description", "required for action=create"))?;
                    let problem_identified_at = req
                        .problem_identified_at
                        .ok_or_else(|| ChronicleError::validation_field("problem_identified_at", "required for action=create"))?;
                    let decision_made_at = req
                        .decision_made_at
                        .ok_or_else(|| ChronicleError::validation_field("decision_made_at", "required for action=create"))?;
                    let record = chronicle_types::DecisionRecord {
                        id: String::new(),
                        conversation_id: ConversationId::new(conversation_id),
                        description,
                        problem_identified_at,
                        decision_made_at,
                        options_considered: req.options_considered,
                        implemented_at: None,
                        outcome_observed_at: None,
                        effectiveness_score: None,
                    };
                    let created = ctx.repos.decisions.create(record).await?;
                    Ok(json!({ "decision": to_json(&created)? }))
                }
                "mark_implemented" => {
                    let decision_id = req
                        .decision_id
                        .ok_or_else(|| ChronicleError::validation_field("decision_id", "required for action=mark_implemented"))?;
                    let at_ms = req.at_ms.ok_or_else(|| ChronicleError::validation_field("at_ms", "required for action=mark_implemented"))?;
                    ctx.repos.decisions.mark_implemented(&decision_id, at_ms).await?;
                    Ok(json!({ "decision_id": decision_id, "implemented_at": at_ms }))
                }
                "mark_outcome_observed" => {
                    let decision_id = req
                        .decision_id
                        .ok_or_else(|| ChronicleError::validation_field("decision_id", "required for action=mark_outcome_observed"))?;
                    let at_ms = req.at_ms.ok_or_else(|| ChronicleError::validation_field("at_ms", "required for action=mark_outcome_observed"))?;
                    let effectiveness_score = req
                        .effectiveness_score
                        .ok_or_else(|| ChronicleError::validation_field("effectiveness_score", "required for action=mark_outcome_observed"))?;
                    ctx.repos.decisions.mark_outcome_observed(&decision_id, at_ms, effectiveness_score).await?;
                    Ok(json!({ "decision_id": decision_id, "outcome_observed_at": at_ms, "effectiveness_score": effectiveness_score }))
                }
                "list" => {
                    let conversation_id = req
                        .conversation_id
                        .ok_or_else(|| ChronicleError::validation_field("conversation_id", "required for action=list"))?;
                    let decisions = ctx.repos.decisions.list_for(&ConversationId::new(conversation_id)).await?;
                    Ok(json!({ "decisions": to_json(&decisions)? }))
                }
                other => Err(ChronicleError::validation_field("action", format!("unknown action '{other}'"))),
            }
        })
    }
}

/// Assemble a composite analytics report out of every analytics
/// repository's current state for a conversation.
pub struct GenerateAnalyticsReport {
    ctx: AppContext,
}

impl GenerateAnalyticsReport {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GenerateAnalyticsReportInput {
    conversation_id: String,
}

impl ToolDyn for GenerateAnalyticsReport {
    fn name(&self) -> &str {
        "generate_analytics_report"
    }

    fn description(&self) -> &str {
        "Assemble a composite report combining a conversation's analytics history, decisions, and the corpus's most circular topics"
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
            let req: GenerateAnalyticsReportInput = parse_input(input)?;
            let cid = ConversationId::new(req.conversation_id);

            let analytics = ctx.repos.conversation_analytics.history_for(&cid, 10).await?;
            let decisions = ctx.repos.decisions.list_for(&cid).await?;
            let insights = ctx.repos.insights.list_for(Some(&cid), 10).await?;
            let gaps = ctx.repos.knowledge_gaps.find_unresolved(10).await?;
            let circular_topics = ctx.repos.topic_evolution.most_circular(10).await?;

            Ok(json!({
                "conversation_id": cid.as_str(),
                "analytics": to_json(&analytics)?,
                "decisions": to_json(&decisions)?,
                "insights": to_json(&insights)?,
                "unresolved_knowledge_gaps": to_json(&gaps)?,
                "most_circular_topics": to_json(&circular_topics)?,
            }))
        })
    }
}
