//! Candidate scoring strategies.
//!
//! Each strategy is a small scoring function, and `Hybrid` composes
//! the others behind fixed weights rather than inheriting from them.

use chronicle_types::Message;

/// Which scoring strategy a candidate pool is ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStrategy {
    /// Most recent first.
    Temporal,
    /// Keyword overlap with the query.
    Topical,
    /// Mentions one of the caller's focus entities.
    EntityCentric,
    /// Weighted composite of the other three.
    Hybrid,
}

impl AssemblyStrategy {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            AssemblyStrategy::Temporal => "temporal",
            AssemblyStrategy::Topical => "topical",
            AssemblyStrategy::EntityCentric => "entity_centric",
            AssemblyStrategy::Hybrid => "hybrid",
        }
    }
}

/// Default hybrid fusion weights: temporal, topical, entity.
pub const HYBRID_WEIGHTS: (f64, f64, f64) = (0.5, 0.3, 0.2);

/// Score one message under `strategy` against the query and focus
/// entities. `recency_rank` is `0.0` for the oldest candidate in the
/// pool and `1.0` for the newest; callers compute it once per pool so
/// strategies stay pure functions of their inputs.
pub fn score_message(message: &Message, recency_rank: f64, query: &str, focus_entities: &[String], strategy: AssemblyStrategy) -> f64 {
    match strategy {
        AssemblyStrategy::Temporal => recency_rank,
        AssemblyStrategy::Topical => topical_overlap(&message.content, query),
        AssemblyStrategy::EntityCentric => entity_overlap(&message.content, focus_entities),
        AssemblyStrategy::Hybrid => {
            let (w_temporal, w_topical, w_entity) = HYBRID_WEIGHTS;
            if focus_entities.is_empty() {
                let total = w_temporal + w_topical;
                (w_temporal * recency_rank + w_topical * topical_overlap(&message.content, query)) / total
            } else {
                w_temporal * recency_rank + w_topical * topical_overlap(&message.content, query) + w_entity * entity_overlap(&message.content, focus_entities)
            }
        }
    }
    .clamp(0.0, 1.0)
}

fn topical_overlap(content: &str, query: &str) -> f64 {
    let query_tokens: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let hits = query_tokens.iter().filter(|t| content_lower.contains(t.as_str())).count();
    hits as f64 / query_tokens.len() as f64
}

fn entity_overlap(content: &str, focus_entities: &[String]) -> f64 {
    if focus_entities.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let hits = focus_entities.iter().filter(|e| content_lower.contains(&e.to_lowercase())).count();
    (hits as f64 / focus_entities.len() as f64).min(1.0)
}

/// A fast, dependency-free token estimate: about four characters per
/// token plus a small per-item overhead.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32 / 4) + 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topical_overlap_counts_matching_tokens() {
        let score = topical_overlap("the pricing api was deployed", "pricing api");
        assert_eq!(score, 1.0);
    }

    #[test]
    fn topical_overlap_is_zero_for_blank_query() {
        assert_eq!(topical_overlap("anything", ""), 0.0);
    }

    #[test]
    fn entity_overlap_matches_case_insensitively() {
        let score = entity_overlap("Acme Corp shipped it", &["acme corp".to_string()]);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn estimate_tokens_is_monotonic_in_length() {
        assert!(estimate_tokens("a longer message here") > estimate_tokens("short"));
    }
}
