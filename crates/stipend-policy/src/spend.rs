//! Spending-limit evaluation.
//!
//! A pure decision function: no clock reads, no storage, no side
//! effects. The caller persists a period rollover and the incremented
//! spent amount only after a request is allowed AND the transfer
//! confirms on-chain.

use serde::{Deserialize, Serialize};

/// Recognized rolling-budget periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
}

impl PeriodType {
    /// Resolve stored text. Unrecognized text yields `None`, which
    /// evaluation treats as a deny (fail closed).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Fixed period duration in milliseconds (monthly is 30 days).
    pub fn duration_ms(&self) -> i64 {
        const DAY: i64 = 24 * 60 * 60 * 1_000;
        match self {
            Self::Daily => DAY,
            Self::Weekly => 7 * DAY,
            Self::Monthly => 30 * DAY,
        }
    }
}

/// The verdict for one requested spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpendDecision {
    pub allowed: bool,
    /// Budget left after the computed reset, before this request.
    pub remaining: u64,
    /// Spent amount with the lazy period reset applied.
    pub effective_spent: u64,
    /// Whether the current period has elapsed at `now`.
    pub period_expired: bool,
}

impl SpendDecision {
    fn deny_closed(spent: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            effective_spent: spent,
            period_expired: false,
        }
    }
}

/// Decide whether `request` smallest units may be drawn right now.
///
/// The period reset is computed, never written: a limit whose period
/// has elapsed evaluates as if spent were zero, and the caller persists
/// the rollover only once a spend actually confirms. A request of
/// exactly the remaining budget is allowed (inclusive boundary); a zero
/// request or a zero limit is always denied.
pub fn evaluate(
    spent: u64,
    limit: u64,
    request: u64,
    period_start: i64,
    period_type: &str,
    now: i64,
) -> SpendDecision {
    let Some(period) = PeriodType::parse(period_type) else {
        // Unknown period text: deny with nothing remaining.
        return SpendDecision::deny_closed(spent);
    };

    let period_expired = now >= period_start.saturating_add(period.duration_ms());
    let effective_spent = if period_expired { 0 } else { spent };
    let remaining = limit.saturating_sub(effective_spent);
    let allowed = request > 0
        && effective_spent
            .checked_add(request)
            .is_some_and(|total| total <= limit);

    SpendDecision {
        allowed,
        remaining,
        effective_spent,
        period_expired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 24 * 60 * 60 * 1_000;

    #[test]
    fn exact_remaining_budget_is_allowed() {
        let d = evaluate(8, 10, 2, 0, "daily", 1_000);
        assert!(d.allowed);
        assert_eq!(d.remaining, 2);
    }

    #[test]
    fn one_over_budget_is_denied() {
        let d = evaluate(9, 10, 2, 0, "daily", 1_000);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 1);
    }

    #[test]
    fn zero_limit_always_denies() {
        assert!(!evaluate(0, 0, 1, 0, "daily", 1_000).allowed);
    }

    #[test]
    fn zero_request_always_denies() {
        let d = evaluate(0, 10, 0, 0, "daily", 1_000);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 10);
    }

    #[test]
    fn elapsed_period_resets_computed_spend() {
        let d = evaluate(10, 10, 1, 0, "daily", DAY + 1);
        assert!(d.period_expired);
        assert_eq!(d.effective_spent, 0);
        assert!(d.allowed);
        assert_eq!(d.remaining, 10);
    }

    #[test]
    fn live_period_keeps_spend() {
        let d = evaluate(10, 10, 1, 0, "daily", DAY - 1);
        assert!(!d.period_expired);
        assert_eq!(d.effective_spent, 10);
        assert!(!d.allowed);
    }

    #[test]
    fn period_boundary_is_expired() {
        assert!(evaluate(5, 10, 1, 0, "daily", DAY).period_expired);
    }

    #[test]
    fn unknown_period_fails_closed() {
        let d = evaluate(3, 10, 1, 0, "quarterly", 1_000);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(!d.period_expired);
    }

    #[test]
    fn weekly_and_monthly_durations() {
        assert!(!evaluate(5, 10, 1, 0, "weekly", 7 * DAY - 1).period_expired);
        assert!(evaluate(5, 10, 1, 0, "weekly", 7 * DAY).period_expired);
        assert!(!evaluate(5, 10, 1, 0, "monthly", 30 * DAY - 1).period_expired);
        assert!(evaluate(5, 10, 1, 0, "monthly", 30 * DAY).period_expired);
    }

    #[test]
    fn overflowing_request_denies() {
        assert!(!evaluate(1, u64::MAX, u64::MAX, 0, "daily", 0).allowed);
    }
}
