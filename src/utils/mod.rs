//! Utility functions for formatting.

pub mod format;

pub use format::{describe_balance, format_amount, BalanceDirection};
