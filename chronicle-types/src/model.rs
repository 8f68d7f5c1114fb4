//! The persisted data model.
//!
//! All timestamps are integer milliseconds since epoch. All `metadata`
//! fields are JSON objects (validated, not arbitrary JSON — see
//! [`crate::validation::validate_metadata`]).

use crate::id::{ConversationId, EntityId, MessageId, ProviderId, RelationshipId, SummaryId};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A conversation: the root of the ownership tree for messages and
/// summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique id.
    pub id: ConversationId,
    /// Creation timestamp (ms).
    pub created_at: i64,
    /// Last-touched timestamp (ms). Invariant: `created_at <= updated_at`,
    /// and `updated_at` is at least the `created_at` of every child message.
    pub updated_at: i64,
    /// Optional human-facing title.
    pub title: Option<String>,
    /// Arbitrary caller metadata (JSON object).
    pub metadata: Json,
    /// Soft-delete marker. `None` when not deleted.
    pub deleted_at: Option<i64>,
}

/// The role a message was authored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Authored by the end user.
    User,
    /// Authored by the assistant.
    Assistant,
    /// A system/instruction message.
    System,
}

impl MessageRole {
    /// Parse from the string stored in the `role` column.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// The string stored in the `role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A single message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique id.
    pub id: MessageId,
    /// Owning conversation. Must reference an existing `Conversation`.
    pub conversation_id: ConversationId,
    /// Author role.
    pub role: MessageRole,
    /// Message body. Non-empty, bounded by configured max length.
    pub content: String,
    /// Creation timestamp (ms). Arrival may be out of order; retrieval
    /// orders ascending by this field unless stated otherwise.
    pub created_at: i64,
    /// Optional parent message, within the same conversation. A message
    /// referencing itself is invalid.
    pub parent_message_id: Option<MessageId>,
    /// Arbitrary caller metadata (JSON object).
    pub metadata: Json,
    /// Opaque embedding blob, if one has been computed.
    pub embedding: Option<Vec<f32>>,
}

/// The granularity of a generated conversation summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLevel {
    /// A one- or two-sentence gist.
    Brief,
    /// A paragraph-scale summary.
    Standard,
    /// A multi-paragraph summary retaining most detail.
    Detailed,
    /// Effectively a cleaned transcript.
    Full,
}

impl SummaryLevel {
    /// Parse from the string stored in the `level` column.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "brief" => Some(Self::Brief),
            "standard" => Some(Self::Standard),
            "detailed" => Some(Self::Detailed),
            "full" => Some(Self::Full),
            _ => None,
        }
    }

    /// The string stored in the `level` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Standard => "standard",
            Self::Detailed => "detailed",
            Self::Full => "full",
        }
    }
}

/// A generated summary of some or all of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Unique id.
    pub id: SummaryId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Summary granularity.
    pub level: SummaryLevel,
    /// The summary text itself.
    pub text: String,
    /// Token count of `text`, as measured by the tokenizer used to produce
    /// it.
    pub token_count: u32,
    /// Name of the summarization provider used.
    pub provider: String,
    /// Model name used.
    pub model: String,
    /// Generation timestamp (ms). Readers pick the most recent by this
    /// field when multiple summaries exist for the same
    /// `(conversation_id, level)`.
    pub generated_at: i64,
    /// Number of messages the summary covers. At least 1.
    pub message_count: u32,
    /// First message covered, if `message_count > 1`.
    pub start_message_id: Option<MessageId>,
    /// Last message covered, if `message_count > 1`. Must differ from
    /// `start_message_id` when `message_count > 1`.
    pub end_message_id: Option<MessageId>,
}

/// The kind of thing a knowledge-graph [`Entity`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A named individual.
    Person,
    /// A company, team, or other organization.
    Organization,
    /// A named product or piece of software.
    Product,
    /// A technical term, library, or technology.
    Technical,
    /// A place.
    Location,
    /// An abstract concept or topic.
    Concept,
    /// A named event.
    Event,
    /// A recorded decision.
    Decision,
}

impl EntityType {
    /// Parse from the string stored in the `type` column.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "person" => Some(Self::Person),
            "organization" => Some(Self::Organization),
            "product" => Some(Self::Product),
            "technical" => Some(Self::Technical),
            "location" => Some(Self::Location),
            "concept" => Some(Self::Concept),
            "event" => Some(Self::Event),
            "decision" => Some(Self::Decision),
            _ => None,
        }
    }

    /// The string stored in the `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Product => "product",
            Self::Technical => "technical",
            Self::Location => "location",
            Self::Concept => "concept",
            Self::Event => "event",
            Self::Decision => "decision",
        }
    }

    /// All variants, used by pattern tables and CHECK-constraint generation.
    pub fn all() -> [Self; 8] {
        [
            Self::Person,
            Self::Organization,
            Self::Product,
            Self::Technical,
            Self::Location,
            Self::Concept,
            Self::Event,
            Self::Decision,
        ]
    }
}

/// A named thing recognized in message content.
///
/// Keyed uniquely by `(normalized_name, type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Unique id.
    pub id: EntityId,
    /// Display name, as first observed.
    pub name: String,
    /// Lowercased, whitespace-collapsed name. Part of the uniqueness key.
    pub normalized_name: String,
    /// Entity kind. Part of the uniqueness key.
    pub entity_type: EntityType,
    /// Extractor confidence in `[0, 1]`.
    pub confidence_score: f64,
    /// Number of mentions recorded across all messages.
    pub mention_count: u32,
    /// Timestamp (ms) of the first mention.
    pub first_seen_at: i64,
    /// Timestamp (ms) of the most recent mention.
    pub last_mentioned_at: i64,
    /// Arbitrary metadata (JSON object).
    pub metadata: Json,
}

/// How an [`EntityMention`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionMethod {
    /// A regex/pattern match.
    Pattern,
    /// A statistical/heuristic scoring pass.
    Statistical,
    /// Recorded by a human or an external caller.
    Manual,
}

impl MentionMethod {
    /// Parse from the string stored in the `method` column.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pattern" => Some(Self::Pattern),
            "statistical" => Some(Self::Statistical),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    /// The string stored in the `method` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Statistical => "statistical",
            Self::Manual => "manual",
        }
    }
}

/// A single occurrence of an [`Entity`] within a [`Message`].
///
/// Lifetime is bound to the message: deleting the message deletes its
/// mentions. Keyed by `(entity_id, message_id, start_offset)` so
/// re-processing a message is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    /// The entity mentioned.
    pub entity_id: EntityId,
    /// The message it was mentioned in.
    pub message_id: MessageId,
    /// Byte offset of the mention's start within the message content.
    pub start_offset: u32,
    /// Byte offset of the mention's end (exclusive).
    pub end_offset: u32,
    /// How the mention was detected.
    pub method: MentionMethod,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

/// The kind of relationship an [`EntityRelationship`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Source is employed by / works for target.
    WorksFor,
    /// Source was created by target.
    CreatedBy,
    /// Source was discussed together with target.
    DiscussedWith,
    /// Source is a part of target.
    PartOf,
    /// A generic, unspecific relation.
    RelatedTo,
    /// Source and target co-occur without a more specific relation.
    MentionedWith,
    /// Source precedes target in time.
    TemporalSequence,
    /// Source causes target.
    CauseEffect,
}

impl RelationshipType {
    /// Parse from the string stored in the `relationship_type` column.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "works_for" => Some(Self::WorksFor),
            "created_by" => Some(Self::CreatedBy),
            "discussed_with" => Some(Self::DiscussedWith),
            "part_of" => Some(Self::PartOf),
            "related_to" => Some(Self::RelatedTo),
            "mentioned_with" => Some(Self::MentionedWith),
            "temporal_sequence" => Some(Self::TemporalSequence),
            "cause_effect" => Some(Self::CauseEffect),
            _ => None,
        }
    }

    /// The string stored in the `relationship_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorksFor => "works_for",
            Self::CreatedBy => "created_by",
            Self::DiscussedWith => "discussed_with",
            Self::PartOf => "part_of",
            Self::RelatedTo => "related_to",
            Self::MentionedWith => "mentioned_with",
            Self::TemporalSequence => "temporal_sequence",
            Self::CauseEffect => "cause_effect",
        }
    }

    /// Whether this type is directional (source ≠ target is enforced) as
    /// opposed to symmetric co-occurrence types.
    pub fn is_directional(&self) -> bool {
        !matches!(self, Self::MentionedWith | Self::RelatedTo)
    }
}

/// A typed, weighted, evidence-accruing edge between two entities.
///
/// Merges by `(source_entity_id, target_entity_id, relationship_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelationship {
    /// Unique id.
    pub id: RelationshipId,
    /// Source entity. Must differ from `target_entity_id` for directional
    /// types.
    pub source_entity_id: EntityId,
    /// Target entity.
    pub target_entity_id: EntityId,
    /// Relationship kind.
    pub relationship_type: RelationshipType,
    /// Accrued strength in `[0, 1]`.
    pub strength: f64,
    /// Average confidence of contributing evidence, in `[0, 1]` (see
    /// DESIGN.md for the Open Question this resolves).
    pub semantic_weight: f64,
    /// Number of distinct messages that contributed evidence. At least 1.
    pub mention_count: u32,
    /// Timestamp (ms) of the first contributing mention.
    pub first_mentioned_at: i64,
    /// Timestamp (ms) of the most recent contributing mention.
    pub last_mentioned_at: i64,
    /// Messages that contributed evidence, in insertion order.
    pub context_message_ids: Vec<MessageId>,
}

/// The deployment kind of an LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Runs on the same host (e.g. a local embedding model).
    Local,
    /// A remote/hosted API.
    External,
}

impl ProviderKind {
    /// Parse from the string stored in the `kind` column.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "external" => Some(Self::External),
            _ => None,
        }
    }

    /// The string stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::External => "external",
        }
    }
}

/// Configuration for an embedding/summarization provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique id.
    pub id: ProviderId,
    /// Human-facing name.
    pub name: String,
    /// Deployment kind.
    pub kind: ProviderKind,
    /// Endpoint URL, for external providers.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key, if any.
    pub api_key_env: Option<String>,
    /// Model identifier.
    pub model_name: String,
    /// Maximum tokens per call. Must be positive.
    pub max_tokens: u32,
    /// Sampling temperature in `[0, 2]`.
    pub temperature: f64,
    /// Whether this config is eligible for selection.
    pub is_active: bool,
    /// Selection priority; higher wins among active configs of the same
    /// kind.
    pub priority: i32,
    /// Estimated cost per 1,000 tokens.
    pub cost_per_1k_tokens: f64,
    /// Arbitrary metadata (JSON object).
    pub metadata: Json,
}

/// An append-only record of one search call, used for analytics and
/// retention-bounded auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetric {
    /// Unique id.
    pub id: String,
    /// The raw query text.
    pub query_text: String,
    /// The strategy actually used (post auto-selection / fallback).
    pub strategy: String,
    /// Number of results returned.
    pub result_count: u32,
    /// Wall-clock duration of the call, in milliseconds.
    pub duration_ms: u32,
    /// When the call was recorded (ms).
    pub timestamp: i64,
}

/// A snapshot of engagement/depth metrics computed for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationAnalytics {
    /// Unique id.
    pub id: String,
    /// The conversation this snapshot describes.
    pub conversation_id: ConversationId,
    /// How actively the user engaged, 0-100, if computable.
    pub engagement_score: Option<f64>,
    /// How deep/substantive the discussion was, 0-100, if computable.
    pub depth_score: Option<f64>,
    /// Message count at the time this snapshot was computed.
    pub message_count: u32,
    /// When this snapshot was computed (ms).
    pub computed_at: i64,
}

/// A time window scored for how productive it was, based on decisions
/// reached within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductivityPattern {
    /// Unique id.
    pub id: String,
    /// Window start (ms, inclusive).
    pub window_start: i64,
    /// Window end (ms, exclusive). Always greater than `window_start`.
    pub window_end: i64,
    /// Productivity score, 0-100, if computable.
    pub productivity_score: Option<f64>,
    /// Number of decisions reached within the window.
    pub decision_count: u32,
    /// Arbitrary metadata (JSON object).
    pub metadata: Json,
}

/// A topic that keeps recurring without a resolution in sight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGap {
    /// Unique id.
    pub id: String,
    /// The recurring topic's label.
    pub topic: String,
    /// How many times it has recurred.
    pub frequency: u32,
    /// When it was first observed (ms).
    pub first_observed_at: i64,
    /// When it was most recently observed (ms).
    pub last_observed_at: i64,
    /// Whether the gap has since been resolved.
    pub resolved: bool,
    /// When it was resolved (ms), required if `resolved`.
    pub resolution_date: Option<i64>,
    /// The conversation in which it was resolved, required if `resolved`.
    pub resolution_conversation_id: Option<ConversationId>,
}

/// A decision tracked from problem to observed outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Unique id.
    pub id: String,
    /// The conversation the decision was made in.
    pub conversation_id: ConversationId,
    /// Human-readable description of the decision.
    pub description: String,
    /// When the underlying problem was first identified (ms).
    pub problem_identified_at: i64,
    /// When the decision was made (ms). Always `>= problem_identified_at`.
    pub decision_made_at: i64,
    /// Alternatives considered before settling on this decision.
    pub options_considered: Vec<String>,
    /// When the decision was acted on (ms), if it has been.
    pub implemented_at: Option<i64>,
    /// When its outcome was observed (ms), if it has been.
    pub outcome_observed_at: Option<i64>,
    /// How effective the decision turned out to be, 0-100, if assessed.
    pub effectiveness_score: Option<f64>,
}

/// A single proactively surfaced observation about a conversation or the
/// corpus as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Unique id.
    pub id: String,
    /// The conversation this insight concerns, if scoped to one.
    pub conversation_id: Option<ConversationId>,
    /// A short category label (e.g. `"pattern"`, `"risk"`, `"follow_up"`).
    pub category: String,
    /// The insight's text.
    pub text: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// When the insight was generated (ms).
    pub created_at: i64,
}

/// Tracks how a topic's prevalence has changed over time, including
/// whether discussion of it tends to circle back without resolving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicEvolution {
    /// Unique id.
    pub id: String,
    /// The topic's label.
    pub topic: String,
    /// When it first occurred (ms).
    pub first_occurred_at: i64,
    /// When it most recently occurred (ms).
    pub last_occurred_at: i64,
    /// Number of times it has occurred.
    pub occurrence_count: u32,
    /// A circularity score in [0, 1]: how often discussion returns to
    /// this topic without an intervening resolution, if computable.
    pub circularity: Option<f64>,
}

/// Bare pagination bookkeeping shared by repository list operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// The page's items.
    pub items: Vec<T>,
    /// Total number of matching rows, regardless of pagination.
    pub total: u64,
    /// The `limit` that was applied.
    pub limit: u32,
    /// The `offset` that was applied.
    pub offset: u64,
}

impl<T> Paginated<T> {
    /// Construct a page.
    pub fn new(items: Vec<T>, total: u64, limit: u32, offset: u64) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_role_round_trips_through_strings() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("bogus"), None);
    }

    #[test]
    fn entity_type_round_trips_through_strings() {
        for ty in EntityType::all() {
            assert_eq!(EntityType::parse(ty.as_str()), Some(ty));
        }
    }

    #[test]
    fn relationship_directionality() {
        assert!(RelationshipType::WorksFor.is_directional());
        assert!(!RelationshipType::MentionedWith.is_directional());
        assert!(!RelationshipType::RelatedTo.is_directional());
    }
}
