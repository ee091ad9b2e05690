//! Filtered views and totals over the cross-group balance summary.
//!
//! Works entirely on the cached `BalanceLine` rows - no fetching here.

use crate::models::BalanceLine;

/// Amounts within this distance of zero count as settled. Currency values
/// arrive as floats and carry rounding noise from the service's split math,
/// so classification never compares against exact zero.
pub const SETTLED_EPSILON: f64 = 0.01;

/// Which slice of the balance summary to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceFilter {
    /// Every row, including ones within the settled epsilon.
    All,
    /// Rows where counterparties owe the current user.
    OwedToMe,
    /// Rows where the current user owes.
    Owe,
}

impl BalanceFilter {
    pub fn matches(&self, amount: f64) -> bool {
        match self {
            BalanceFilter::All => true,
            BalanceFilter::OwedToMe => amount > SETTLED_EPSILON,
            BalanceFilter::Owe => amount < -SETTLED_EPSILON,
        }
    }
}

/// The rows matching a filter, in their original order.
pub fn filter_lines<'a>(lines: &'a [BalanceLine], filter: BalanceFilter) -> Vec<&'a BalanceLine> {
    lines.iter().filter(|l| filter.matches(l.amount)).collect()
}

/// Total over the filtered rows. `Owe` sums absolute values (a displayable
/// "you owe" figure), `OwedToMe` and `All` sum the raw signed values - so an
/// `All` total may be negative.
pub fn total_for(lines: &[BalanceLine], filter: BalanceFilter) -> f64 {
    lines
        .iter()
        .filter(|l| filter.matches(l.amount))
        .map(|l| match filter {
            BalanceFilter::Owe => l.amount.abs(),
            _ => l.amount,
        })
        .sum()
}
