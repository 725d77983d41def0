//! Token counting for chat exchanges.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;

use super::event::UsageEvent;
use super::store::UsageStore;
use crate::error::{Result, TelltaleError};

/// Turns text into a token count.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u64;

    /// Short identifier for logs.
    fn name(&self) -> &'static str;
}

/// Counts with the `cl100k_base` BPE encoding.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Build the `cl100k_base` encoder.
    ///
    /// # Errors
    ///
    /// Returns error if the encoder tables cannot be loaded.
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(TelltaleError::Other)?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> u64 {
        u64::try_from(self.bpe.encode_with_special_tokens(text).len()).unwrap_or(u64::MAX)
    }

    fn name(&self) -> &'static str {
        "cl100k_base"
    }
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TiktokenCounter(cl100k_base)")
    }
}

/// Rough estimate of one token per four characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharEstimateCounter;

impl TokenCounter for CharEstimateCounter {
    fn count(&self, text: &str) -> u64 {
        u64::try_from(text.chars().count().div_ceil(4)).unwrap_or(u64::MAX)
    }

    fn name(&self) -> &'static str {
        "char-estimate"
    }
}

/// The BPE counter, or the estimator if the encoder is unavailable.
#[must_use]
pub fn default_counter() -> Arc<dyn TokenCounter> {
    match TiktokenCounter::cl100k() {
        Ok(counter) => Arc::new(counter),
        Err(err) => {
            tracing::warn!(error = %err, "tokenizer unavailable, estimating from characters");
            Arc::new(CharEstimateCounter)
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn is_completion(&self) -> bool {
        self.role.eq_ignore_ascii_case("assistant")
    }
}

/// Records one usage event per chat exchange.
#[derive(Clone)]
pub struct UsageCounter {
    counter: Arc<dyn TokenCounter>,
    store: Arc<UsageStore>,
}

impl UsageCounter {
    #[must_use]
    pub fn new(counter: Arc<dyn TokenCounter>, store: Arc<UsageStore>) -> Self {
        Self { counter, store }
    }

    /// Prompt and completion token counts for `messages`.
    #[must_use]
    pub fn count(&self, messages: &[ChatMessage]) -> (u64, u64) {
        messages.iter().fold((0u64, 0u64), |(prompt, completion), message| {
            let tokens = self.counter.count(&message.content);
            if message.is_completion() {
                (prompt, completion.saturating_add(tokens))
            } else {
                (prompt.saturating_add(tokens), completion)
            }
        })
    }

    /// Count an exchange and append it to the ledger.
    ///
    /// # Errors
    ///
    /// Returns error if the ledger cannot be persisted. The event is still
    /// recorded in memory.
    pub fn record_exchange(&self, provider: &str, model: &str, messages: &[ChatMessage]) -> Result<UsageEvent> {
        let (prompt, completion) = self.count(messages);
        let event = UsageEvent::new(provider, model, prompt, completion);
        tracing::debug!(
            counter = self.counter.name(),
            prompt,
            completion,
            "counted exchange"
        );
        self.store.record(event.clone())?;
        Ok(event)
    }
}

impl std::fmt::Debug for UsageCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageCounter")
            .field("counter", &self.counter.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::test_utils::FixedCounter;
    use crate::usage::UsageWindow;

    #[test]
    fn char_estimate_rounds_up() {
        assert_eq!(CharEstimateCounter.count(""), 0);
        assert_eq!(CharEstimateCounter.count("abc"), 1);
        assert_eq!(CharEstimateCounter.count("abcde"), 2);
    }

    #[test]
    fn tiktoken_counts_known_text() {
        let counter = TiktokenCounter::cl100k().expect("encoder");
        assert_eq!(counter.count("hello world"), 2);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn assistant_messages_count_as_completion() {
        let store = Arc::new(UsageStore::load(Host::builder().build().expect("host")));
        let counter = UsageCounter::new(Arc::new(FixedCounter::new(10)), Arc::clone(&store));
        let messages = [
            ChatMessage::new("system", "be brief"),
            ChatMessage::new("user", "hi"),
            ChatMessage::new("assistant", "hello"),
        ];
        let event = counter.record_exchange("openai", "gpt-4o", &messages).expect("record");
        assert_eq!(event.prompt_tokens(), 20);
        assert_eq!(event.completion_tokens(), 10);
        assert_eq!(store.query(UsageWindow::All).used, 30);
    }
}
