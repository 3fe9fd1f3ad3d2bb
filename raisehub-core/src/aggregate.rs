//! Aggregate maintenance.
//!
//! Handlers never touch `PlatformStats` directly. Each one returns a
//! [`StatsDelta`] describing how the totals move for the event it handled,
//! and the router applies that delta in the same store transaction as the
//! entity writes and the checkpoint.

use crate::entities::Role;
use rust_decimal::Decimal;
use thiserror::Error;

/// A running total left the range of [`Decimal`] or `i64`.
///
/// Quantities are bounded by the 96-bit decimal mantissa. Reaching the bound
/// halts indexing before the event is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} overflowed")]
pub struct Overflow(pub &'static str);

/// `a + b` for a named quantity, failing instead of panicking on overflow.
pub fn checked_sum(field: &'static str, a: Decimal, b: Decimal) -> Result<Decimal, Overflow> {
    a.checked_add(b).ok_or(Overflow(field))
}

pub(crate) fn checked_count(field: &'static str, a: i64, b: i64) -> Result<i64, Overflow> {
    a.checked_add(b).ok_or(Overflow(field))
}

/// Relative change to the platform totals caused by one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub users: i64,
    pub founders: i64,
    pub investors: i64,
    pub rounds: i64,
    pub raised: Decimal,
    pub trades: i64,
    pub trade_volume: Decimal,
}

impl StatsDelta {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// A user row was created with the given role.
    ///
    /// Role counters only move on creation. A later re-registration under
    /// another role leaves both counters untouched.
    pub fn user_created(role: Role) -> Self {
        Self {
            users: 1,
            founders: i64::from(role == Role::Founder),
            investors: i64::from(role == Role::Investor),
            ..Self::default()
        }
    }

    pub fn round_created() -> Self {
        Self {
            rounds: 1,
            ..Self::default()
        }
    }

    pub fn trade_executed(total_price: Decimal) -> Self {
        Self {
            trades: 1,
            trade_volume: total_price,
            ..Self::default()
        }
    }

    pub fn capital_raised(amount: Decimal) -> Self {
        Self {
            raised: amount,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::platform_stats::PlatformStats;

    #[test]
    fn test_user_created_counts_role_once() {
        let founder = StatsDelta::user_created(Role::Founder);
        assert_eq!(founder.users, 1);
        assert_eq!(founder.founders, 1);
        assert_eq!(founder.investors, 0);

        let nobody = StatsDelta::user_created(Role::None);
        assert_eq!(nobody.users, 1);
        assert_eq!(nobody.founders + nobody.investors, 0);
    }

    #[test]
    fn test_apply_accumulates() {
        let mut stats = PlatformStats::default();
        stats
            .apply(&StatsDelta::trade_executed(Decimal::from(200)), 41)
            .unwrap();
        stats
            .apply(&StatsDelta::trade_executed(Decimal::from(300)), 41)
            .unwrap();
        stats.apply(&StatsDelta::round_created(), 42).unwrap();

        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.total_trade_volume, Decimal::from(500));
        assert_eq!(stats.total_rounds, 1);
        assert_eq!(stats.updated_at, 42);
    }

    #[test]
    fn test_default_delta_is_zero() {
        assert!(StatsDelta::default().is_zero());
        assert!(!StatsDelta::capital_raised(Decimal::ONE).is_zero());
    }

    #[test]
    fn test_apply_overflow_leaves_totals_untouched() {
        let half = Decimal::from_i128_with_scale(1i128 << 95, 0);
        let mut stats = PlatformStats::default();
        stats.apply(&StatsDelta::capital_raised(half), 1).unwrap();
        stats.apply(&StatsDelta::trade_executed(half), 1).unwrap();

        let before = stats.clone();
        assert_eq!(
            stats.apply(&StatsDelta::capital_raised(half), 2),
            Err(Overflow("total_raised"))
        );
        assert_eq!(
            stats.apply(&StatsDelta::trade_executed(half), 2),
            Err(Overflow("total_trade_volume"))
        );
        assert_eq!(stats, before);
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(
            checked_sum("amount", Decimal::from(2), Decimal::from(3)),
            Ok(Decimal::from(5))
        );
        assert_eq!(
            checked_sum("amount", Decimal::MAX, Decimal::ONE),
            Err(Overflow("amount"))
        );
    }
}
