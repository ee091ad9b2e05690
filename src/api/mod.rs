//! Gateway to the remote ledger service.
//!
//! `LedgerGateway` is the seam the synchronization engine talks through:
//! `LedgerClient` implements it over HTTP, tests substitute a scripted mock.
//! The contract is plain request/response with at most one call in flight
//! per operation - no streaming, no webhooks.

pub mod client;
pub mod error;

pub use client::LedgerClient;
pub use error::ApiError;

use crate::models::{
    BalanceLine, Expense, ExpenseRequest, Group, GroupBalance, GroupStatus, SettlementStatus, User,
};

pub type ApiResult<T> = Result<T, ApiError>;

/// Logical operations of the remote ledger service, independent of wire
/// encoding. The service is authoritative for all balance computation and
/// for the settlement quorum; the client never reimplements either.
#[allow(async_fn_in_trait)]
pub trait LedgerGateway {
    /// Groups the user belongs to, filtered by lifecycle status.
    async fn list_groups(&self, user_id: i64, status: GroupStatus) -> ApiResult<Vec<Group>>;

    /// Create a group with the given member set. The response omits `status`.
    async fn create_group(&self, name: &str, member_ids: &[i64]) -> ApiResult<Group>;

    async fn list_group_members(&self, group_id: i64) -> ApiResult<Vec<User>>;

    /// Record the user's approval to settle the group. The service flips the
    /// group to settled on its own once every member has approved.
    async fn request_settle(&self, group_id: i64, user_id: i64) -> ApiResult<()>;

    async fn get_settlement_status(&self, group_id: i64) -> ApiResult<SettlementStatus>;

    /// Expenses for a group, newest first.
    async fn list_expenses(&self, group_id: i64) -> ApiResult<Vec<Expense>>;

    /// Record a new expense; returns the created entity with its server-side
    /// id and timestamp.
    async fn add_expense(&self, request: &ExpenseRequest) -> ApiResult<Expense>;

    async fn delete_expense(&self, expense_id: i64) -> ApiResult<()>;

    /// The given user's net position within one group.
    async fn get_group_balance(&self, group_id: i64, user_id: i64) -> ApiResult<GroupBalance>;

    /// The user's cross-group balance summary, one line per group.
    async fn get_user_balance(&self, user_id: i64, status: GroupStatus)
        -> ApiResult<Vec<BalanceLine>>;

    /// The full user directory.
    async fn list_users(&self) -> ApiResult<Vec<User>>;
}
