//! Metered usage events and aggregation windows.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::TelltaleError;

/// One metered exchange. `total_tokens` is always the sum of its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawUsageEvent")]
pub struct UsageEvent {
    provider: String,
    model: String,
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUsageEvent {
    provider: String,
    model: String,
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    timestamp: DateTime<Utc>,
}

impl From<RawUsageEvent> for UsageEvent {
    fn from(raw: RawUsageEvent) -> Self {
        Self::new(raw.provider, raw.model, raw.prompt_tokens, raw.completion_tokens)
            .at(raw.timestamp)
    }
}

impl UsageEvent {
    /// Create an event stamped now.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub const fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    #[must_use]
    pub const fn completion_tokens(&self) -> u64 {
        self.completion_tokens
    }

    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Persisted ledger document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDocument {
    #[serde(default)]
    pub usage_data: Vec<UsageEvent>,
    #[serde(default)]
    pub limits: BTreeMap<String, u64>,
}

/// Time range an aggregate query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
pub enum UsageWindow {
    #[default]
    #[serde(rename = "24h")]
    #[value(name = "24h")]
    Day,
    #[serde(rename = "7d")]
    #[value(name = "7d")]
    Week,
    #[serde(rename = "30d")]
    #[value(name = "30d")]
    Month,
    #[serde(rename = "all")]
    #[value(name = "all")]
    All,
}

impl UsageWindow {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
            Self::All => "all",
        }
    }

    /// Length of the window, or `None` for the whole ledger.
    #[must_use]
    pub const fn span(self) -> Option<TimeDelta> {
        match self {
            Self::Day => Some(TimeDelta::hours(24)),
            Self::Week => Some(TimeDelta::days(7)),
            Self::Month => Some(TimeDelta::days(30)),
            Self::All => None,
        }
    }

    /// Earliest timestamp included when evaluated at `now`.
    #[must_use]
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.span().and_then(|span| now.checked_sub_signed(span))
    }
}

impl fmt::Display for UsageWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageWindow {
    type Err = TelltaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "24h" | "day" => Ok(Self::Day),
            "7d" | "week" => Ok(Self::Week),
            "30d" | "month" => Ok(Self::Month),
            "all" => Ok(Self::All),
            other => Err(TelltaleError::InvalidWindow(other.to_string())),
        }
    }
}
