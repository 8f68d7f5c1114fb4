//! Versioned schema migrations.
//!
//! Each [`Migration`] is a pair of ordered SQL statement lists, `up` and
//! `down`. Versions are contiguous starting at 1; [`validate`] checks
//! that invariant before [`crate::store::Store`] ever opens a
//! connection.

/// A single schema revision.
pub struct Migration {
    /// Monotonically increasing, unique, contiguous from 1.
    pub version: i64,
    /// One-line human description, surfaced in logs.
    pub description: &'static str,
    /// Statements applied in order to move forward one version.
    pub up: &'static [&'static str],
    /// Statements applied in order to move backward one version.
    pub down: &'static [&'static str],
}

const V1_UP: &[&str] = &[
    "PRAGMA foreign_keys = ON;",
    r#"CREATE TABLE IF NOT EXISTS persistence_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        title TEXT,
        metadata TEXT NOT NULL DEFAULT '{}',
        deleted_at INTEGER
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_conversations_updated_at ON conversations(updated_at DESC);",
    r#"CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        parent_message_id TEXT REFERENCES messages(id) ON DELETE SET NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        embedding BLOB
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation_created ON messages(conversation_id, created_at);",
    "CREATE INDEX IF NOT EXISTS idx_messages_parent ON messages(parent_message_id);",
    r#"CREATE TRIGGER IF NOT EXISTS trg_messages_no_self_parent
        BEFORE INSERT ON messages
        WHEN NEW.parent_message_id = NEW.id
        BEGIN
            SELECT RAISE(ABORT, 'message cannot be its own parent');
        END;"#,
];
const V1_DOWN: &[&str] = &[
    "DROP TRIGGER IF EXISTS trg_messages_no_self_parent;",
    "DROP TABLE IF EXISTS messages;",
    "DROP TABLE IF EXISTS conversations;",
    "DROP TABLE IF EXISTS persistence_state;",
];

const V2_UP: &[&str] = &[
    r#"CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
        content,
        message_id UNINDEXED,
        tokenize = 'porter unicode61'
    );"#,
    r#"CREATE TRIGGER IF NOT EXISTS trg_messages_fts_insert
        AFTER INSERT ON messages
        BEGIN
            INSERT INTO messages_fts(rowid, content, message_id)
            VALUES (NEW.rowid, NEW.content, NEW.id);
        END;"#,
    r#"CREATE TRIGGER IF NOT EXISTS trg_messages_fts_update
        AFTER UPDATE OF content ON messages
        BEGIN
            UPDATE messages_fts SET content = NEW.content WHERE rowid = NEW.rowid;
        END;"#,
    r#"CREATE TRIGGER IF NOT EXISTS trg_messages_fts_delete
        AFTER DELETE ON messages
        BEGIN
            DELETE FROM messages_fts WHERE rowid = OLD.rowid;
        END;"#,
];
const V2_DOWN: &[&str] = &[
    "DROP TRIGGER IF EXISTS trg_messages_fts_delete;",
    "DROP TRIGGER IF EXISTS trg_messages_fts_update;",
    "DROP TRIGGER IF EXISTS trg_messages_fts_insert;",
    "DROP TABLE IF EXISTS messages_fts;",
];

const V3_UP: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS conversation_summaries (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        level TEXT NOT NULL CHECK (level IN ('brief', 'standard', 'detailed', 'full')),
        text TEXT NOT NULL,
        token_count INTEGER NOT NULL CHECK (token_count >= 0),
        provider TEXT NOT NULL,
        model TEXT NOT NULL,
        generated_at INTEGER NOT NULL,
        message_count INTEGER NOT NULL CHECK (message_count >= 1),
        start_message_id TEXT REFERENCES messages(id) ON DELETE SET NULL,
        end_message_id TEXT REFERENCES messages(id) ON DELETE SET NULL
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_summaries_conv_level_gen ON conversation_summaries(conversation_id, level, generated_at DESC);",
    r#"CREATE TABLE IF NOT EXISTS summary_cache (
        cache_key TEXT PRIMARY KEY,
        summary_ids TEXT NOT NULL DEFAULT '[]',
        assembled_context TEXT NOT NULL,
        token_count INTEGER NOT NULL CHECK (token_count >= 0),
        created_at INTEGER NOT NULL,
        accessed_at INTEGER NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS llm_providers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL CHECK (kind IN ('local', 'external')),
        endpoint TEXT,
        api_key_env TEXT,
        model_name TEXT NOT NULL,
        max_tokens INTEGER NOT NULL CHECK (max_tokens > 0),
        temperature REAL NOT NULL CHECK (temperature >= 0 AND temperature <= 2),
        is_active INTEGER NOT NULL DEFAULT 1,
        priority INTEGER NOT NULL DEFAULT 0,
        cost_per_1k_tokens REAL NOT NULL DEFAULT 0 CHECK (cost_per_1k_tokens >= 0),
        metadata TEXT NOT NULL DEFAULT '{}'
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_providers_active_priority ON llm_providers(is_active, priority DESC);",
    r#"INSERT INTO llm_providers (id, name, kind, endpoint, api_key_env, model_name, max_tokens, temperature, is_active, priority, cost_per_1k_tokens, metadata)
        VALUES
        ('builtin-local-embedder', 'local embedder', 'local', NULL, NULL, 'builtin-embed-v1', 8192, 0.0, 1, 0, 0.0, '{}'),
        ('builtin-summarizer', 'default summarizer', 'external', NULL, 'CHRONICLE_SUMMARIZER_API_KEY', 'builtin-summarize-v1', 4096, 0.2, 1, 0, 0.0, '{}');"#,
];
const V3_DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS llm_providers;",
    "DROP TABLE IF EXISTS summary_cache;",
    "DROP TABLE IF EXISTS conversation_summaries;",
];

const V4_UP: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        normalized_name TEXT NOT NULL,
        type TEXT NOT NULL CHECK (type IN ('person', 'organization', 'product', 'technical', 'location', 'concept', 'event', 'decision')),
        confidence_score REAL NOT NULL CHECK (confidence_score >= 0 AND confidence_score <= 1),
        mention_count INTEGER NOT NULL DEFAULT 0 CHECK (mention_count >= 0),
        first_seen_at INTEGER NOT NULL,
        last_mentioned_at INTEGER NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        UNIQUE (normalized_name, type)
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_entities_type_mentions ON entities(type, mention_count DESC);",
    r#"CREATE TABLE IF NOT EXISTS entity_mentions (
        entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
        start_offset INTEGER NOT NULL,
        end_offset INTEGER NOT NULL CHECK (end_offset > start_offset),
        method TEXT NOT NULL CHECK (method IN ('pattern', 'statistical', 'manual')),
        confidence REAL NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
        PRIMARY KEY (entity_id, message_id, start_offset)
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_mentions_message ON entity_mentions(message_id);",
    r#"CREATE TABLE IF NOT EXISTS entity_relationships (
        id TEXT PRIMARY KEY,
        source_entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        target_entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        relationship_type TEXT NOT NULL CHECK (relationship_type IN
            ('works_for', 'created_by', 'discussed_with', 'part_of', 'related_to',
             'mentioned_with', 'temporal_sequence', 'cause_effect')),
        strength REAL NOT NULL CHECK (strength >= 0 AND strength <= 1),
        semantic_weight REAL NOT NULL CHECK (semantic_weight >= 0 AND semantic_weight <= 1),
        mention_count INTEGER NOT NULL CHECK (mention_count >= 1),
        first_mentioned_at INTEGER NOT NULL,
        last_mentioned_at INTEGER NOT NULL,
        context_message_ids TEXT NOT NULL DEFAULT '[]',
        UNIQUE (source_entity_id, target_entity_id, relationship_type)
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_relationships_source ON entity_relationships(source_entity_id, strength DESC);",
    "CREATE INDEX IF NOT EXISTS idx_relationships_target ON entity_relationships(target_entity_id, strength DESC);",
];
const V4_DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS entity_relationships;",
    "DROP TABLE IF EXISTS entity_mentions;",
    "DROP TABLE IF EXISTS entities;",
];

const V5_UP: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS conversation_analytics (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        engagement_score REAL CHECK (engagement_score IS NULL OR (engagement_score >= 0 AND engagement_score <= 100)),
        depth_score REAL CHECK (depth_score IS NULL OR (depth_score >= 0 AND depth_score <= 100)),
        message_count INTEGER NOT NULL DEFAULT 0 CHECK (message_count >= 0),
        computed_at INTEGER NOT NULL
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_conv_analytics_conv ON conversation_analytics(conversation_id);",
    r#"CREATE TABLE IF NOT EXISTS productivity_patterns (
        id TEXT PRIMARY KEY,
        window_start INTEGER NOT NULL,
        window_end INTEGER NOT NULL,
        productivity_score REAL CHECK (productivity_score IS NULL OR (productivity_score >= 0 AND productivity_score <= 100)),
        decision_count INTEGER NOT NULL DEFAULT 0 CHECK (decision_count >= 0),
        metadata TEXT NOT NULL DEFAULT '{}',
        CHECK (window_end > window_start)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS knowledge_gaps (
        id TEXT PRIMARY KEY,
        topic TEXT NOT NULL,
        frequency INTEGER NOT NULL CHECK (frequency > 0),
        first_observed_at INTEGER NOT NULL,
        last_observed_at INTEGER NOT NULL,
        resolved INTEGER NOT NULL DEFAULT 0,
        resolution_date INTEGER,
        resolution_conversation_id TEXT REFERENCES conversations(id) ON DELETE SET NULL,
        CHECK (last_observed_at >= first_observed_at)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS decision_tracking (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        description TEXT NOT NULL,
        problem_identified_at INTEGER NOT NULL,
        decision_made_at INTEGER NOT NULL,
        options_considered TEXT NOT NULL DEFAULT '[]',
        implemented_at INTEGER,
        outcome_observed_at INTEGER,
        effectiveness_score REAL CHECK (effectiveness_score IS NULL OR (effectiveness_score >= 0 AND effectiveness_score <= 100)),
        CHECK (problem_identified_at <= decision_made_at),
        CHECK (implemented_at IS NULL OR implemented_at >= decision_made_at),
        CHECK (outcome_observed_at IS NULL OR implemented_at IS NULL OR outcome_observed_at >= implemented_at)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS insights (
        id TEXT PRIMARY KEY,
        conversation_id TEXT REFERENCES conversations(id) ON DELETE CASCADE,
        category TEXT NOT NULL,
        text TEXT NOT NULL,
        confidence REAL NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
        created_at INTEGER NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS topic_evolution (
        id TEXT PRIMARY KEY,
        topic TEXT NOT NULL,
        first_occurred_at INTEGER NOT NULL,
        last_occurred_at INTEGER NOT NULL,
        occurrence_count INTEGER NOT NULL DEFAULT 0 CHECK (occurrence_count >= 0),
        circularity REAL CHECK (circularity IS NULL OR (circularity >= 0 AND circularity <= 1)),
        CHECK (last_occurred_at >= first_occurred_at)
    );"#,
];
const V5_DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS topic_evolution;",
    "DROP TABLE IF EXISTS insights;",
    "DROP TABLE IF EXISTS decision_tracking;",
    "DROP TABLE IF EXISTS knowledge_gaps;",
    "DROP TABLE IF EXISTS productivity_patterns;",
    "DROP TABLE IF EXISTS conversation_analytics;",
];

const V6_UP: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS search_config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );"#,
    r#"INSERT INTO search_config (key, value) VALUES
        ('hybrid_weight_semantic', '0.6'),
        ('hybrid_weight_fts', '0.4');"#,
    r#"CREATE TABLE IF NOT EXISTS search_metrics (
        id TEXT PRIMARY KEY,
        query_text TEXT NOT NULL,
        strategy TEXT NOT NULL,
        result_count INTEGER NOT NULL CHECK (result_count >= 0),
        duration_ms INTEGER NOT NULL CHECK (duration_ms >= 0),
        timestamp INTEGER NOT NULL
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_search_metrics_timestamp ON search_metrics(timestamp DESC);",
    r#"CREATE TABLE IF NOT EXISTS trigger_performance_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        trigger_name TEXT NOT NULL,
        duration_us INTEGER NOT NULL CHECK (duration_us >= 0),
        recorded_at INTEGER NOT NULL
    );"#,
];
const V6_DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS trigger_performance_log;",
    "DROP TABLE IF EXISTS search_metrics;",
    "DROP TABLE IF EXISTS search_config;",
];

const V7_UP: &[&str] = &[
    r#"CREATE TRIGGER IF NOT EXISTS trg_knowledge_gaps_resolved_requires_fields
        BEFORE UPDATE ON knowledge_gaps
        WHEN NEW.resolved = 1 AND (NEW.resolution_date IS NULL OR NEW.resolution_conversation_id IS NULL)
        BEGIN
            SELECT RAISE(ABORT, 'resolved knowledge gap requires resolution_date and resolution_conversation_id');
        END;"#,
    r#"CREATE TRIGGER IF NOT EXISTS trg_knowledge_gaps_resolved_requires_fields_ins
        BEFORE INSERT ON knowledge_gaps
        WHEN NEW.resolved = 1 AND (NEW.resolution_date IS NULL OR NEW.resolution_conversation_id IS NULL)
        BEGIN
            SELECT RAISE(ABORT, 'resolved knowledge gap requires resolution_date and resolution_conversation_id');
        END;"#,
];
const V7_DOWN: &[&str] = &[
    "DROP TRIGGER IF EXISTS trg_knowledge_gaps_resolved_requires_fields_ins;",
    "DROP TRIGGER IF EXISTS trg_knowledge_gaps_resolved_requires_fields;",
];

/// The full ordered migration list. Versions are contiguous from 1;
/// [`validate`] enforces this before any connection touches disk.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "core tables: persistence_state, conversations, messages",
        up: V1_UP,
        down: V1_DOWN,
    },
    Migration {
        version: 2,
        description: "messages_fts shadow table and maintenance triggers",
        up: V2_UP,
        down: V2_DOWN,
    },
    Migration {
        version: 3,
        description: "summaries, summary cache, llm providers",
        up: V3_UP,
        down: V3_DOWN,
    },
    Migration {
        version: 4,
        description: "entity and knowledge-graph tables",
        up: V4_UP,
        down: V4_DOWN,
    },
    Migration {
        version: 5,
        description: "analytics tables",
        up: V5_UP,
        down: V5_DOWN,
    },
    Migration {
        version: 6,
        description: "search config, search metrics, trigger performance log",
        up: V6_UP,
        down: V6_DOWN,
    },
    Migration {
        version: 7,
        description: "validation triggers for knowledge gap resolution",
        up: V7_UP,
        down: V7_DOWN,
    },
];

/// The latest schema version this binary knows how to produce.
pub fn latest_version() -> i64 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Validate the migration list's structural invariants: versions start
/// at 1, are contiguous, unique, and every migration has a non-empty
/// description and a non-empty `up` list.
pub fn validate(migrations: &[Migration]) -> Result<(), String> {
    let mut versions: Vec<i64> = migrations.iter().map(|m| m.version).collect();
    versions.sort_unstable();
    for (idx, v) in versions.iter().enumerate() {
        let expected = (idx as i64) + 1;
        if *v != expected {
            return Err(format!(
                "migration list is not contiguous from 1: expected version {expected}, found {v}"
            ));
        }
    }
    for m in migrations {
        if m.description.is_empty() {
            return Err(format!("migration {} has an empty description", m.version));
        }
        if m.up.is_empty() {
            return Err(format!("migration {} has an empty up list", m.version));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_migration_list_is_valid() {
        validate(MIGRATIONS).expect("builtin migrations must validate");
    }

    #[test]
    fn detects_missing_version() {
        let bad = [
            Migration {
                version: 1,
                description: "a",
                up: &["SELECT 1;"],
                down: &[],
            },
            Migration {
                version: 3,
                description: "b",
                up: &["SELECT 1;"],
                down: &[],
            },
        ];
        let err = validate(&bad).unwrap_err();
        assert!(err.contains("version 2"), "error was: {err}");
    }

    #[test]
    fn detects_empty_description() {
        let bad = [Migration {
            version: 1,
            description: "",
            up: &["SELECT 1;"],
            down: &[],
        }];
        assert!(validate(&bad).is_err());
    }

    #[test]
    fn latest_version_matches_last_entry() {
        assert_eq!(latest_version(), MIGRATIONS.last().unwrap().version);
    }
}
