//! Co-occurrence based relationship detection.

use crate::extractor::ExtractedEntity;
use chronicle_types::RelationshipType;

/// Maximum character distance between two entity mentions for them to
/// be considered co-occurring at all.
pub const DEFAULT_MAX_CHAR_DISTANCE: u32 = 200;
/// Relationships below this confidence are dropped by default.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.4;

const CUE_WORDS: &[(&str, RelationshipType)] = &[
    ("works for", RelationshipType::WorksFor),
    ("works at", RelationshipType::WorksFor),
    ("employed by", RelationshipType::WorksFor),
    ("created by", RelationshipType::CreatedBy),
    ("built by", RelationshipType::CreatedBy),
    ("made by", RelationshipType::CreatedBy),
    ("part of", RelationshipType::PartOf),
    ("belongs to", RelationshipType::PartOf),
    ("causes", RelationshipType::CauseEffect),
    ("leads to", RelationshipType::CauseEffect),
    ("results in", RelationshipType::CauseEffect),
    ("discussed with", RelationshipType::DiscussedWith),
    ("talked with", RelationshipType::DiscussedWith),
    ("spoke with", RelationshipType::DiscussedWith),
    ("then", RelationshipType::TemporalSequence),
    ("after", RelationshipType::TemporalSequence),
    ("before", RelationshipType::TemporalSequence),
];
const NEGATION_CUES: &[&str] = &["not", "no longer", "former", "ex-", "never"];

/// One detected relationship candidate between two entity mentions in
/// the same message.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedRelationship {
    /// Index into the extracted-entity list for the source.
    pub source_index: usize,
    /// Index into the extracted-entity list for the target.
    pub target_index: usize,
    /// Classified relationship type.
    pub relationship_type: RelationshipType,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

/// Tunables for [`detect`].
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Entity pairs further apart than this (in characters) are ignored.
    pub max_char_distance: u32,
    /// Candidates below this confidence are dropped.
    pub min_confidence: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_char_distance: DEFAULT_MAX_CHAR_DISTANCE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// Detect relationships among co-occurring entities within `text`.
/// Every pair within `config.max_char_distance` characters of each
/// other is scored from proximity and the pair's average extraction
/// confidence, then boosted by a cue word between the two mentions or
/// reduced by a negation cue, and finally clamped to `[0.0, 1.0]` and
/// filtered below `config.min_confidence`.
pub fn detect(text: &str, entities: &[ExtractedEntity], config: DetectorConfig) -> Vec<DetectedRelationship> {
    let lower = text.to_lowercase();
    let mut out = Vec::new();

    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            let a = &entities[i];
            let b = &entities[j];
            let (left, right) = if a.start_offset <= b.start_offset { (a, b) } else { (b, a) };
            let distance = right.start_offset.saturating_sub(left.end_offset);
            if distance > config.max_char_distance {
                continue;
            }

            let between_start = left.end_offset as usize;
            let between_end = right.start_offset as usize;
            let between = if between_start <= between_end && between_end <= lower.len() {
                &lower[between_start..between_end]
            } else {
                ""
            };

            let distance_score = 1.0 - (distance as f64 / config.max_char_distance.max(1) as f64);
            let avg_entity_confidence = (a.confidence + b.confidence) / 2.0;
            let mut confidence = (distance_score + avg_entity_confidence) / 2.0;

            let mut relationship_type = default_relationship_type(a, b);
            for (cue, cue_type) in CUE_WORDS {
                if between.contains(cue) {
                    relationship_type = *cue_type;
                    confidence += 0.2;
                    break;
                }
            }
            if NEGATION_CUES.iter().any(|cue| between.contains(cue)) {
                confidence -= 0.3;
            }

            out.push(DetectedRelationship {
                source_index: i,
                target_index: j,
                relationship_type,
                confidence: confidence.clamp(0.0, 1.0),
            });
        }
    }

    out.into_iter().filter(|r| r.confidence >= config.min_confidence).collect()
}

fn default_relationship_type(a: &ExtractedEntity, b: &ExtractedEntity) -> RelationshipType {
    use chronicle_types::EntityType::*;
    match (a.entity_type, b.entity_type) {
        (Person, Organization) | (Organization, Person) => RelationshipType::WorksFor,
        (Person, Person) => RelationshipType::DiscussedWith,
        _ => RelationshipType::MentionedWith,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{extract, ExtractorConfig};

    #[test]
    fn detects_works_for_from_person_and_organization_co_occurrence() {
        let text = "Dr. Alice Chen at Acme Corp deployed the pricing API";
        let entities = extract(text, ExtractorConfig::default());
        let relationships = detect(text, &entities, DetectorConfig::default());
        assert!(!relationships.is_empty());
        assert!(relationships.iter().all(|r| r.confidence >= DEFAULT_MIN_CONFIDENCE));
    }

    #[test]
    fn distant_entities_are_not_related() {
        let entities = vec![
            ExtractedEntity {
                text: "Alice".into(),
                normalized: "alice".into(),
                entity_type: chronicle_types::EntityType::Person,
                confidence: 0.8,
                start_offset: 0,
                end_offset: 5,
            },
            ExtractedEntity {
                text: "Bob".into(),
                normalized: "bob".into(),
                entity_type: chronicle_types::EntityType::Person,
                confidence: 0.8,
                start_offset: 5000,
                end_offset: 5003,
            },
        ];
        let text = " ".repeat(5003);
        let relationships = detect(&text, &entities, DetectorConfig::default());
        assert!(relationships.is_empty());
    }
}
