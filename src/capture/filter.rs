//! Entry filtering by level, category and text.

use serde::{Deserialize, Serialize};

use super::entry::{LogCategory, LogEntry, LogLevel};

/// Criteria an entry must meet. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub category: Option<LogCategory>,
    /// Case-insensitive substring matched against the message and data.
    pub search: Option<String>,
}

impl LogFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub const fn category(mut self, category: LogCategory) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = (!text.is_empty()).then_some(text);
        self
    }

    /// Whether every set criterion holds for `entry`.
    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.level.is_some_and(|level| level != entry.level()) {
            return false;
        }
        if self.category.is_some_and(|category| category != entry.category()) {
            return false;
        }
        match &self.search {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                entry.message().to_lowercase().contains(&needle)
                    || entry
                        .data()
                        .is_some_and(|data| data.to_string().to_lowercase().contains(&needle))
            }
        }
    }

    /// Whether no criterion is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.level.is_none() && self.category.is_none() && self.search.is_none()
    }
}
