//! Data models for ledger entities.
//!
//! This module contains the data structures shared between the gateway, the
//! cache, and the synchronization engine:
//!
//! - `User`, `Group`: identity-bearing entities, referenced by id everywhere
//! - `Expense`: a single recorded expense within a group
//! - `GroupBalance`, `BalanceLine`: service-computed balance views
//! - `SettlementStatus`: per-group settlement-approval quorum state

pub mod balance;
pub mod expense;
pub mod group;
pub mod settlement;

pub use balance::{BalanceDetail, BalanceLine, GroupBalance};
pub use expense::{Expense, ExpenseRequest};
pub use group::{Group, GroupStatus, User};
pub use settlement::SettlementStatus;
