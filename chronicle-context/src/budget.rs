//! Token budget decomposition.

/// How a `maxTokens` budget is carved up before admission. Fractions
/// are fixed: 60% messages/snippets, 25% summaries, 10% metadata,
/// 5% headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Tokens available for message/snippet content.
    pub messages: u32,
    /// Tokens available for conversation summaries.
    pub summaries: u32,
    /// Tokens available for structural metadata (headers, separators).
    pub metadata: u32,
    /// Unallocated headroom, never deliberately spent.
    pub buffer: u32,
}

impl TokenBudget {
    /// Split `max_tokens` into the fixed 60/25/10/5 decomposition.
    /// Rounding favors `messages` so the four parts always sum back to
    /// `max_tokens`.
    pub fn decompose(max_tokens: u32) -> Self {
        let summaries = (max_tokens as f64 * 0.25).floor() as u32;
        let metadata = (max_tokens as f64 * 0.10).floor() as u32;
        let buffer = (max_tokens as f64 * 0.05).floor() as u32;
        let messages = max_tokens.saturating_sub(summaries + metadata + buffer);
        Self {
            messages,
            summaries,
            metadata,
            buffer,
        }
    }

    /// 10% of `messages` reserved up front for `includeRecent`
    /// admission.
    pub fn recent_reservation(&self) -> u32 {
        (self.messages as f64 * 0.10).floor() as u32
    }
}

/// Actual token counts spent per category in one assembled context.
/// Always sums exactly to the assembled text's total token count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenBreakdown {
    /// Tokens spent on message/snippet content.
    pub messages: u32,
    /// Tokens spent on summaries.
    pub summaries: u32,
    /// Tokens spent on metadata (headers).
    pub metadata: u32,
    /// Tokens spent on structural formatting (separators) not
    /// attributable to any one category above.
    pub buffer: u32,
}

impl TokenBreakdown {
    /// The sum of every category, equal to the assembled text's total
    /// token count by construction.
    pub fn total(&self) -> u32 {
        self.messages + self.summaries + self.metadata + self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposition_sums_to_max_tokens() {
        for max_tokens in [50, 500, 2000, 8000] {
            let budget = TokenBudget::decompose(max_tokens);
            assert_eq!(budget.messages + budget.summaries + budget.metadata + budget.buffer, max_tokens);
        }
    }

    #[test]
    fn messages_gets_the_majority_share() {
        let budget = TokenBudget::decompose(1000);
        assert!(budget.messages > budget.summaries);
        assert!(budget.summaries > budget.metadata);
    }
}
