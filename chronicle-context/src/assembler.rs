//! `ContextAssembler`: assembles a token-budgeted
//! context window for a downstream LLM call out of stored messages and
//! summaries.

use crate::budget::{TokenBreakdown, TokenBudget};
use crate::strategies::{estimate_tokens, score_message, AssemblyStrategy};
use chronicle_repo::{MessagePage, MessageRepository, SummaryRepository};
use chronicle_types::{validation, ChronicleError, ConversationId, Message};
use std::sync::Arc;

const MAX_CONVERSATIONS_PER_ASSEMBLY: usize = 5;
const CONVERSATION_SEPARATOR: &str = "\n\n---\n\n";
const CANDIDATE_POOL_MULTIPLIER: u32 = 4;

/// One request to [`ContextAssembler::assemble`].
#[derive(Debug, Clone)]
pub struct AssembleRequest {
    /// Free-text query driving topical/hybrid scoring.
    pub query: String,
    /// Hard ceiling on the assembled text's token count.
    pub max_tokens: u32,
    /// Which scoring strategy ranks candidates.
    pub strategy: AssemblyStrategy,
    /// Conversations to draw candidates from. At least one is required.
    pub conversation_ids: Vec<ConversationId>,
    /// Candidates scoring below this are dropped before admission.
    pub min_relevance: f64,
    /// Reserve a slice of the messages budget for the most recent
    /// messages before scored admission runs.
    pub include_recent: bool,
    /// Entity names that boost `EntityCentric`/`Hybrid` scoring.
    pub focus_entities: Vec<String>,
    /// Restrict candidate messages to `[start, end]` inclusive.
    pub time_window: Option<(i64, i64)>,
}

/// One item admitted into the assembled context.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludedItem {
    /// `"message"` or `"summary"`.
    pub kind: &'static str,
    /// The source row's id.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Estimated tokens this item contributed.
    pub token_count: u32,
    /// The score it was admitted with.
    pub score: f64,
}

/// The result of one `assemble` call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// The assembled text, ready to hand to a model.
    pub text: String,
    /// Total estimated token count of `text`.
    pub token_count: u32,
    /// Per-category token spend; sums exactly to `token_count`.
    pub token_breakdown: TokenBreakdown,
    /// Every item admitted, in the order they appear in `text`.
    pub included_items: Vec<IncludedItem>,
    /// The strategy actually used.
    pub strategy: AssemblyStrategy,
    /// How many candidates were considered before admission.
    pub candidates_considered: usize,
}

/// Assembles token-budgeted context windows from the message and
/// summary repositories.
pub struct ContextAssembler {
    messages: Arc<MessageRepository>,
    summaries: Arc<SummaryRepository>,
}

impl ContextAssembler {
    /// Build an assembler over the given repositories.
    pub fn new(messages: Arc<MessageRepository>, summaries: Arc<SummaryRepository>) -> Self {
        Self { messages, summaries }
    }

    /// Assemble a context window.L's budget decomposition
    /// and selection algorithm.
    pub async fn assemble(&self, request: AssembleRequest) -> Result<AssembledContext, ChronicleError> {
        validation::validate_token_budget(request.max_tokens)?;
        if request.conversation_ids.is_empty() {
            return Err(ChronicleError::validation_field("conversation_ids", "must name at least one conversation"));
        }
        if let Some((start, end)) = request.time_window {
            validation::validate_time_range(Some(start), Some(end))?;
        }

        let budget = TokenBudget::decompose(request.max_tokens);
        let conversation_ids = self.rank_conversations(&request).await?;

        let mut breakdown = TokenBreakdown::default();
        let mut sections: Vec<String> = Vec::new();
        let mut included_items: Vec<IncludedItem> = Vec::new();
        let mut candidates_considered = 0usize;

        for conversation_id in &conversation_ids {
            let (section_text, section_items, messages_spent, summaries_spent, considered) =
                self.assemble_conversation(conversation_id, &request, &budget, &breakdown).await?;
            candidates_considered += considered;
            if section_text.is_empty() {
                continue;
            }
            breakdown.messages += messages_spent;
            breakdown.summaries += summaries_spent;
            included_items.extend(section_items);
            sections.push(section_text);
        }

        let header = format!("Context assembled from {} conversation(s).", conversation_ids.len());
        let header_tokens = estimate_tokens(&header).min(budget.metadata);
        breakdown.metadata += header_tokens;

        let body = sections.join(CONVERSATION_SEPARATOR);
        let text = if body.is_empty() {
            header
        } else {
            format!("{header}\n\n{body}")
        };

        let token_count = estimate_tokens(&text);
        let categorized = breakdown.messages + breakdown.summaries + breakdown.metadata;
        breakdown.buffer = token_count.saturating_sub(categorized);

        Ok(AssembledContext {
            text,
            token_count,
            token_breakdown: breakdown,
            included_items,
            strategy: request.strategy,
            candidates_considered,
        })
    }

    async fn rank_conversations(&self, request: &AssembleRequest) -> Result<Vec<ConversationId>, ChronicleError> {
        if request.conversation_ids.len() <= MAX_CONVERSATIONS_PER_ASSEMBLY {
            return Ok(request.conversation_ids.clone());
        }
        let mut scored = Vec::with_capacity(request.conversation_ids.len());
        for conversation_id in &request.conversation_ids {
            let messages = self.recent_messages(conversation_id, request.time_window).await?;
            let avg_relevance = if messages.is_empty() {
                0.0
            } else {
                let total: f64 = messages
                    .iter()
                    .map(|m| score_message(m, 0.5, &request.query, &request.focus_entities, request.strategy))
                    .sum();
                total / messages.len() as f64
            };
            scored.push((conversation_id.clone(), avg_relevance));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(MAX_CONVERSATIONS_PER_ASSEMBLY);
        Ok(scored.into_iter().map(|(id, _)| id).collect())
    }

    async fn recent_messages(&self, conversation_id: &ConversationId, time_window: Option<(i64, i64)>) -> Result<Vec<Message>, ChronicleError> {
        let page = MessagePage {
            limit: 200,
            before_id: None,
            after_id: None,
        };
        let mut messages = self.messages.find_by_conversation_id(conversation_id, page).await?;
        if let Some((start, end)) = time_window {
            messages.retain(|m| m.created_at >= start && m.created_at <= end);
        }
        Ok(messages)
    }

    #[allow(clippy::too_many_arguments)]
    async fn assemble_conversation(
        &self,
        conversation_id: &ConversationId,
        request: &AssembleRequest,
        budget: &TokenBudget,
        spent_so_far: &TokenBreakdown,
    ) -> Result<(String, Vec<IncludedItem>, u32, u32, usize), ChronicleError> {
        let messages = self.recent_messages(conversation_id, request.time_window).await?;
        let candidates_considered = messages.len();
        if messages.is_empty() {
            return Ok((String::new(), Vec::new(), 0, 0, 0));
        }

        let oldest = messages.first().map(|m| m.created_at).unwrap_or(0);
        let newest = messages.last().map(|m| m.created_at).unwrap_or(0);
        let span = (newest - oldest).max(1) as f64;

        let mut scored: Vec<(f64, &Message)> = messages
            .iter()
            .map(|m| {
                let recency_rank = (m.created_at - oldest) as f64 / span;
                let score = score_message(m, recency_rank, &request.query, &request.focus_entities, request.strategy);
                (score, m)
            })
            .filter(|(score, _)| *score >= request.min_relevance)
            .collect();

        let messages_remaining = budget.messages.saturating_sub(spent_so_far.messages);
        let summaries_remaining = budget.summaries.saturating_sub(spent_so_far.summaries);

        let mut items = Vec::new();
        let mut body_parts: Vec<String> = Vec::new();
        let mut messages_spent = 0u32;
        let mut admitted_ids = std::collections::HashSet::new();

        if request.include_recent {
            let reserved = budget.recent_reservation().min(messages_remaining);
            let mut recent_sorted = messages.clone();
            recent_sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            for message in &recent_sorted {
                let tokens = estimate_tokens(&message.content);
                if messages_spent + tokens > reserved {
                    break;
                }
                messages_spent += tokens;
                admitted_ids.insert(message.id.clone());
                body_parts.push(message.content.clone());
                items.push(IncludedItem {
                    kind: "message",
                    id: message.id.as_str().to_string(),
                    conversation_id: conversation_id.clone(),
                    token_count: tokens,
                    score: 1.0,
                });
            }
        }

        let avg_tokens_per_item = if scored.is_empty() {
            1.0
        } else {
            scored.iter().map(|(_, m)| estimate_tokens(&m.content) as f64).sum::<f64>() / scored.len() as f64
        };
        let pool_cap = ((messages_remaining as f64 / avg_tokens_per_item.max(1.0)) * CANDIDATE_POOL_MULTIPLIER as f64).ceil() as usize;
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(pool_cap.max(1));

        for (score, message) in scored {
            if admitted_ids.contains(&message.id) {
                continue;
            }
            let tokens = estimate_tokens(&message.content);
            if messages_spent + tokens > messages_remaining {
                continue;
            }
            messages_spent += tokens;
            admitted_ids.insert(message.id.clone());
            body_parts.push(message.content.clone());
            items.push(IncludedItem {
                kind: "message",
                id: message.id.as_str().to_string(),
                conversation_id: conversation_id.clone(),
                token_count: tokens,
                score,
            });
        }

        let summaries = self.summaries.list_for(conversation_id).await?;
        let mut summaries_spent = 0u32;
        for summary in summaries {
            let tokens = estimate_tokens(&summary.text);
            if summaries_spent + tokens > summaries_remaining {
                continue;
            }
            summaries_spent += tokens;
            body_parts.insert(0, summary.text.clone());
            items.push(IncludedItem {
                kind: "summary",
                id: summary.id.as_str().to_string(),
                conversation_id: conversation_id.clone(),
                token_count: tokens,
                score: 1.0,
            });
        }

        let section = body_parts.join("\n");
        Ok((section, items, messages_spent, summaries_spent, candidates_considered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_repo::{blank_conversation, ConversationRepository};
    use chronicle_store::{ConnectionPool, QueryCache};
    use chronicle_types::{Message, MessageRole};
    use std::sync::Arc;

    async fn setup() -> (ContextAssembler, ConversationId) {
        let pool = ConnectionPool::open_in_memory(2).expect("open pool");
        let cache = Arc::new(QueryCache::new());
        let conversations = ConversationRepository::new(pool.clone(), cache.clone());
        let messages = Arc::new(MessageRepository::new(pool.clone(), cache.clone()));
        let summaries = Arc::new(SummaryRepository::new(pool, cache));

        let conversation = blank_conversation(ConversationId::generate(), 1_000);
        conversations.create(conversation.clone()).await.expect("create conversation");

        for i in 0..5 {
            let message = Message {
                id: chronicle_types::MessageId::generate(),
                conversation_id: conversation.id.clone(),
                role: MessageRole::User,
                content: format!("message number {i} about the pricing api"),
                created_at: 1_000 + i,
                parent_message_id: None,
                metadata: serde_json::json!({}),
                embedding: None,
            };
            messages.create(message).await.expect("create message");
        }

        (ContextAssembler::new(messages, summaries), conversation.id)
    }

    #[tokio::test]
    async fn assembled_context_respects_the_token_budget() {
        let (assembler, conversation_id) = setup().await;
        let request = AssembleRequest {
            query: "pricing api".to_string(),
            max_tokens: 500,
            strategy: AssemblyStrategy::Hybrid,
            conversation_ids: vec![conversation_id],
            min_relevance: 0.0,
            include_recent: true,
            focus_entities: Vec::new(),
            time_window: None,
        };
        let assembled = assembler.assemble(request).await.expect("assemble");
        assert!(assembled.token_count <= 500);
        assert_eq!(assembled.token_breakdown.total(), assembled.token_count);
    }

    #[tokio::test]
    async fn rejects_empty_conversation_list() {
        let (assembler, _conversation_id) = setup().await;
        let request = AssembleRequest {
            query: "pricing api".to_string(),
            max_tokens: 500,
            strategy: AssemblyStrategy::Temporal,
            conversation_ids: Vec::new(),
            min_relevance: 0.0,
            include_recent: false,
            focus_entities: Vec::new(),
            time_window: None,
        };
        assert!(assembler.assemble(request).await.is_err());
    }
}
