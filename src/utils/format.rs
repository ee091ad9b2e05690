//! Display helpers for currency amounts and net balances.

use crate::summary::SETTLED_EPSILON;

/// Format an amount as a dollar string, e.g. `$12.50` or `-$3.00`.
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}

/// How a net amount reads from the current user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceDirection {
    OwedToYou,
    YouOwe,
    Settled,
}

impl BalanceDirection {
    /// Classify with the settled epsilon rather than exact zero.
    pub fn classify(amount: f64) -> Self {
        if amount > SETTLED_EPSILON {
            BalanceDirection::OwedToYou
        } else if amount < -SETTLED_EPSILON {
            BalanceDirection::YouOwe
        } else {
            BalanceDirection::Settled
        }
    }
}

/// One-line description of a net balance.
pub fn describe_balance(amount: f64) -> String {
    match BalanceDirection::classify(amount) {
        BalanceDirection::OwedToYou => format!("You're owed {}", format_amount(amount)),
        BalanceDirection::YouOwe => format!("You owe {}", format_amount(amount.abs())),
        BalanceDirection::Settled => "All settled up".to_string(),
    }
}
