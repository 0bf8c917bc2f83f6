use std::collections::VecDeque;

/// Estimate token count using the chars/4 heuristic.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Token-counting capability. Defaults to [`estimate_tokens`]; swap in a
/// model-specific tokenizer without touching the memory itself.
pub type TokenCounter = fn(&str) -> usize;

/// One question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Ordered, token-bounded log of prior turns for one conversation.
///
/// Turns are append-only and strictly chronological. The cumulative token
/// cost of retained turns never exceeds `max_tokens`: before an append,
/// the oldest turns are evicted until the new turn fits.
#[derive(Debug)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    costs: VecDeque<usize>,
    total_tokens: usize,
    max_tokens: usize,
    counter: TokenCounter,
}

impl ConversationMemory {
    #[must_use]
    pub fn new(max_tokens: usize) -> Self {
        Self::with_counter(max_tokens, estimate_tokens)
    }

    #[must_use]
    pub fn with_counter(max_tokens: usize, counter: TokenCounter) -> Self {
        Self {
            turns: VecDeque::new(),
            costs: VecDeque::new(),
            total_tokens: 0,
            max_tokens,
            counter,
        }
    }

    /// Append a completed turn, evicting oldest turns first until the
    /// token budget holds. A single turn larger than the whole budget is
    /// not retained; the budget is the invariant.
    pub fn append(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        let turn = Turn {
            question: question.into(),
            answer: answer.into(),
        };
        let cost = (self.counter)(&turn.question) + (self.counter)(&turn.answer);

        if cost > self.max_tokens {
            tracing::warn!(
                cost,
                max_tokens = self.max_tokens,
                "turn exceeds the whole memory budget, not retained"
            );
            return;
        }

        while self.total_tokens + cost > self.max_tokens {
            self.turns.pop_front();
            if let Some(evicted) = self.costs.pop_front() {
                self.total_tokens -= evicted;
            }
        }

        self.total_tokens += cost;
        self.turns.push_back(turn);
        self.costs.push_back(cost);
    }

    /// Read-only copy of retained turns, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    #[must_use]
    pub fn token_count(&self) -> usize {
        self.total_tokens
    }

    #[must_use]
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
