//! Number formatting utilities.

/// Format a percentage rounded to whole numbers.
#[must_use]
pub fn format_percent(value: f64) -> String {
    format!("{value:.0}%")
}

/// Format a token count compactly (`12.5K`, `1.5M`).
#[must_use]
pub fn format_tokens(value: u64) -> String {
    fn format_compact(value: u64, divisor: u64, suffix: &str) -> String {
        let major = value / divisor;
        let minor = (value % divisor) / (divisor / 10);
        format!("{major}.{minor}{suffix}")
    }

    if value >= 1_000_000 {
        format_compact(value, 1_000_000, "M")
    } else if value >= 1_000 {
        format_compact(value, 1_000, "K")
    } else {
        value.to_string()
    }
}
