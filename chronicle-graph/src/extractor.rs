//! Deterministic, pattern-based entity extraction.
//!
//! No statistical model is involved: every rule here is a fixed string
//! or capitalization pattern, so the same message always yields the
//! same entities at the same confidence. `MentionMethod::Pattern` is
//! recorded against every candidate produced by this module.

use chronicle_types::EntityType;

const HONORIFICS: &[&str] = &["Dr.", "Mr.", "Mrs.", "Ms.", "Prof."];
const CORPORATE_SUFFIXES: &[&str] = &[
    "Corp", "Corp.", "Inc", "Inc.", "LLC", "Ltd", "Ltd.", "Co", "Co.", "Company", "Group", "Labs", "Corporation",
];
const LOCATION_SUFFIXES: &[&str] = &[
    "Street", "Avenue", "Boulevard", "Road", "City", "County", "River", "Mountain", "Lake",
];
const EVENT_CUES: &[&str] = &["meeting", "conference", "summit", "launch", "release", "workshop"];
const DECISION_CUES: &[&str] = &["decided to", "agreed to", "chose to", "resolved to"];
const GENERIC_STOPWORDS: &[&str] = &["The", "This", "That", "A", "An", "I", "We", "It", "They"];
const FOLLOWING_PREPOSITIONS: &[&str] = &["at", "for", "with", "from", "of"];

/// Minimum confidence kept by default.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
/// Maximum entities extracted per message by default.
pub const DEFAULT_MAX_ENTITIES: usize = 50;

/// One extracted entity candidate, before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    /// Surface text as it appeared in the message.
    pub text: String,
    /// Lowercased, whitespace-collapsed form used for dedup/lookup.
    pub normalized: String,
    /// Classified entity type.
    pub entity_type: EntityType,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Character offset of the first character, inclusive.
    pub start_offset: u32,
    /// Character offset one past the last character, exclusive.
    pub end_offset: u32,
}

/// Tunables for [`extract`].
#[derive(Debug, Clone, Copy)]
pub struct ExtractorConfig {
    /// Candidates below this confidence are dropped.
    pub min_confidence: f64,
    /// At most this many candidates are returned, highest confidence
    /// (then earliest position) first.
    pub max_entities_per_message: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_entities_per_message: DEFAULT_MAX_ENTITIES,
        }
    }
}

struct Word<'a> {
    text: &'a str,
    start: u32,
    end: u32,
}

fn words(text: &str) -> Vec<Word<'_>> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let word_start = start;
        let mut word_end = start + c.len_utf8();
        chars.next();
        while let Some(&(idx, c2)) = chars.peek() {
            if c2.is_whitespace() {
                break;
            }
            word_end = idx + c2.len_utf8();
            chars.next();
        }
        out.push(Word {
            text: &text[word_start..word_end],
            start: word_start as u32,
            end: word_end as u32,
        });
    }
    out
}

fn strip_trailing_punct(word: &str) -> &str {
    word.trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '.')
}

fn is_capitalized(word: &str) -> bool {
    let core = strip_trailing_punct(word).trim_end_matches('.');
    core.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

fn is_all_caps_acronym(word: &str) -> bool {
    let core = strip_trailing_punct(word);
    core.len() >= 2 && core.len() <= 6 && core.chars().all(|c| c.is_ascii_uppercase())
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Extract entity candidates from `text`, clamping confidence to
/// `[0.0, 1.0]`, filtering below `config.min_confidence`, and capping
/// at `config.max_entities_per_message` ranked by confidence desc then
/// start offset asc.
pub fn extract(text: &str, config: ExtractorConfig) -> Vec<ExtractedEntity> {
    let tokens = words(text);
    let mut candidates = Vec::new();

    extract_proper_noun_runs(&tokens, text, &mut candidates);
    extract_acronyms(&tokens, &mut candidates);
    extract_event_cues(&tokens, text, &mut candidates);
    extract_decision_cues(text, &mut candidates);
    extract_quoted_concepts(text, &mut candidates);

    let mut kept: Vec<ExtractedEntity> = candidates
        .into_iter()
        .map(|mut c| {
            c.confidence = c.confidence.clamp(0.0, 1.0);
            c
        })
        .filter(|c| c.confidence >= config.min_confidence)
        .collect();

    kept.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.start_offset.cmp(&b.start_offset))
    });
    kept.truncate(config.max_entities_per_message);
    kept
}

fn extract_proper_noun_runs(tokens: &[Word<'_>], text: &str, out: &mut Vec<ExtractedEntity>) {
    let mut i = 0;
    while i < tokens.len() {
        let honorific = HONORIFICS.contains(&tokens[i].text);
        let run_start = i;
        if honorific {
            i += 1;
        }
        let proper_start = i;
        while i < tokens.len() && is_capitalized(tokens[i].text) {
            i += 1;
        }
        let run_len = i - proper_start;
        if run_len == 0 || (run_len < 2 && !honorific) {
            i = if i == proper_start { proper_start + 1 } else { i };
            continue;
        }
        let start = tokens[run_start].start;
        let end = tokens[i - 1].end;
        let surface = &text[start as usize..end as usize];
        let last_core = strip_trailing_punct(tokens[i - 1].text).trim_end_matches('.');
        let first_core = strip_trailing_punct(tokens[proper_start].text);

        let is_org = CORPORATE_SUFFIXES.iter().any(|s| s.trim_end_matches('.') == last_core);
        let is_loc = LOCATION_SUFFIXES.contains(&last_core);
        let is_generic_lead = !honorific && run_len < 2 && GENERIC_STOPWORDS.contains(&first_core);

        if is_generic_lead {
            continue;
        }

        let mut confidence = 0.5;
        if run_len >= 2 {
            confidence += 0.15;
        }
        let next_is_prep = tokens
            .get(i)
            .map(|w| FOLLOWING_PREPOSITIONS.contains(&strip_trailing_punct(w.text)))
            .unwrap_or(false);
        if next_is_prep {
            confidence += 0.1;
        }

        let entity_type = if is_org {
            confidence += 0.15;
            EntityType::Organization
        } else if is_loc {
            confidence += 0.1;
            EntityType::Location
        } else if honorific {
            confidence += 0.1;
            EntityType::Person
        } else {
            EntityType::Person
        };

        out.push(ExtractedEntity {
            text: surface.to_string(),
            normalized: normalize(surface),
            entity_type,
            confidence,
            start_offset: start,
            end_offset: end,
        });
    }
}

fn extract_acronyms(tokens: &[Word<'_>], out: &mut Vec<ExtractedEntity>) {
    for w in tokens {
        let core = strip_trailing_punct(w.text);
        if is_all_caps_acronym(core) {
            out.push(ExtractedEntity {
                text: core.to_string(),
                normalized: normalize(core),
                entity_type: EntityType::Technical,
                confidence: 0.5 + 0.1,
                start_offset: w.start,
                end_offset: w.start + core.len() as u32,
            });
        }
    }
}

fn extract_event_cues(tokens: &[Word<'_>], text: &str, out: &mut Vec<ExtractedEntity>) {
    for (idx, w) in tokens.iter().enumerate() {
        let core = strip_trailing_punct(w.text).to_lowercase();
        if EVENT_CUES.contains(&core.as_str()) {
            if let Some(next) = tokens.get(idx + 1) {
                if is_capitalized(next.text) {
                    let mut end_idx = idx + 1;
                    while end_idx + 1 < tokens.len() && is_capitalized(tokens[end_idx + 1].text) {
                        end_idx += 1;
                    }
                    let start = w.start;
                    let end = tokens[end_idx].end;
                    let surface = &text[start as usize..end as usize];
                    out.push(ExtractedEntity {
                        text: surface.to_string(),
                        normalized: normalize(surface),
                        entity_type: EntityType::Event,
                        confidence: 0.5 + 0.15,
                        start_offset: start,
                        end_offset: end,
                    });
                }
            }
        }
    }
}

fn extract_decision_cues(text: &str, out: &mut Vec<ExtractedEntity>) {
    let lower = text.to_lowercase();
    for cue in DECISION_CUES {
        if let Some(pos) = lower.find(cue) {
            let clause_start = pos + cue.len();
            let rest = &text[clause_start..];
            let clause_end_rel = rest.find(['.', '!', '?']).unwrap_or(rest.len());
            let raw = &rest[..clause_end_rel];
            let leading_ws = raw.len() - raw.trim_start().len();
            let clause = raw[leading_ws..].trim_end();
            if clause.is_empty() {
                continue;
            }
            let start = (clause_start + leading_ws) as u32;
            out.push(ExtractedEntity {
                text: clause.to_string(),
                normalized: normalize(clause),
                entity_type: EntityType::Decision,
                confidence: 0.5 + 0.1,
                start_offset: start,
                end_offset: start + clause.len() as u32,
            });
        }
    }
}

fn extract_quoted_concepts(text: &str, out: &mut Vec<ExtractedEntity>) {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if let Some(rel_end) = text[i + 1..].find('"') {
                let start = i as u32 + 1;
                let end = start + rel_end as u32;
                let phrase = &text[(start as usize)..(end as usize)];
                if !phrase.trim().is_empty() && phrase.split_whitespace().count() <= 8 {
                    out.push(ExtractedEntity {
                        text: phrase.to_string(),
                        normalized: normalize(phrase),
                        entity_type: EntityType::Concept,
                        confidence: 0.5 + 0.05,
                        start_offset: start,
                        end_offset: end,
                    });
                }
                i = (end as usize) + 1;
                continue;
            }
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_person_and_organization_from_seed_sentence() {
        let text = "Dr. Alice Chen at Acme Corp deployed the pricing API";
        let entities = extract(text, ExtractorConfig::default());
        let person = entities.iter().find(|e| e.entity_type == EntityType::Person).expect("person");
        assert_eq!(person.normalized, "dr. alice chen");
        assert!(person.confidence >= 0.6);

        let org = entities.iter().find(|e| e.entity_type == EntityType::Organization).expect("organization");
        assert_eq!(org.normalized, "acme corp");
        assert!(org.confidence >= 0.6);
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "Dr. Alice Chen at Acme Corp deployed the pricing API";
        let first = extract(text, ExtractorConfig::default());
        let second = extract(text, ExtractorConfig::default());
        assert_eq!(first, second);
    }

    #[test]
    fn respects_max_entities_cap() {
        let text = "Dr. Alice Chen at Acme Corp deployed the pricing API";
        let config = ExtractorConfig {
            min_confidence: 0.0,
            max_entities_per_message: 1,
        };
        let entities = extract(text, config);
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn detects_acronym_as_technical() {
        let entities = extract("The SQL query failed", ExtractorConfig::default());
        assert!(entities.iter().any(|e| e.entity_type == EntityType::Technical && e.normalized == "sql"));
    }
}
