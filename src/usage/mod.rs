//! Token usage accounting.
//!
//! A [`UsageStore`] keeps a rolling ledger of metered exchanges and the
//! configured per-provider limits; [`aggregate`] turns it into windowed
//! totals, per-provider shares and a daily series.

pub mod aggregate;
pub mod counter;
pub mod event;
pub mod store;

pub use aggregate::{DailySeries, ProviderShare, UsageStats, aggregate};
pub use counter::{
    CharEstimateCounter, ChatMessage, TiktokenCounter, TokenCounter, UsageCounter, default_counter,
};
pub use event::{UsageDocument, UsageEvent, UsageWindow};
pub use store::{DEFAULT_RETENTION_DAYS, USAGE_STORE_KEY, UsageStore};
