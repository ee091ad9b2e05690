//! The in-memory store for all cached ledger state.
//!
//! Entities are keyed by natural id, with groups partitioned by lifecycle
//! state. All mutation goes through named operations so the single-writer
//! rule stays auditable; the synchronization engine is the only caller of
//! the mutators. Read accessors never trigger I/O, and a group with no
//! cached entry reads as empty rather than failing - callers treat "absent"
//! and "empty" as equivalent until a fetch completes.

use std::collections::HashMap;

use crate::models::{
    BalanceLine, Expense, Group, GroupBalance, GroupStatus, SettlementStatus, User,
};

#[derive(Debug)]
pub struct LedgerCache {
    current_user: User,
    current_group: Option<Group>,
    active_groups: Vec<Group>,
    settled_groups: Vec<Group>,
    expenses_by_group: HashMap<i64, Vec<Expense>>,
    members_by_group: HashMap<i64, Vec<User>>,
    /// Current user's net position per group, as returned by the service.
    balances_by_group: HashMap<i64, GroupBalance>,
    /// Net amounts per (group, member). Keyed by both ids so two groups'
    /// member balances can never collide.
    member_balances: HashMap<(i64, i64), f64>,
    balance_lines: Vec<BalanceLine>,
    settlement_by_group: HashMap<i64, SettlementStatus>,
    loading: bool,
    last_error: Option<String>,
}

impl LedgerCache {
    /// An empty cache for the given user. Nothing is populated until the
    /// synchronization engine runs.
    pub fn new(current_user: User) -> Self {
        Self {
            current_user,
            current_group: None,
            active_groups: Vec::new(),
            settled_groups: Vec::new(),
            expenses_by_group: HashMap::new(),
            members_by_group: HashMap::new(),
            balances_by_group: HashMap::new(),
            member_balances: HashMap::new(),
            balance_lines: Vec::new(),
            settlement_by_group: HashMap::new(),
            loading: false,
            last_error: None,
        }
    }

    // =========================================================================
    // Mutators (engine only)
    // =========================================================================

    /// Replace the current user. Does not drop any other cached state; the
    /// engine decides what to invalidate on a user switch.
    pub fn set_current_user(&mut self, user: User) {
        self.current_user = user;
    }

    /// Drop every cache that is relative to the current user: per-group
    /// balances, per-member balances, and the cross-group summary.
    pub fn clear_user_scoped(&mut self) {
        self.balances_by_group.clear();
        self.member_balances.clear();
        self.balance_lines.clear();
    }

    pub fn set_current_group(&mut self, group: Option<Group>) {
        self.current_group = group;
    }

    /// Replace the group list for one lifecycle state.
    pub fn set_groups(&mut self, status: GroupStatus, groups: Vec<Group>) {
        match status {
            GroupStatus::Active => self.active_groups = groups,
            GroupStatus::Settled => self.settled_groups = groups,
        }
    }

    /// Insert or update a single group in the list matching its status.
    /// Groups without a status (freshly created) are treated as active.
    pub fn upsert_group(&mut self, group: Group) {
        let list = match group.status {
            Some(GroupStatus::Settled) => &mut self.settled_groups,
            _ => &mut self.active_groups,
        };
        if let Some(existing) = list.iter_mut().find(|g| g.id == group.id) {
            *existing = group;
        } else {
            list.push(group);
        }
    }

    pub fn replace_expenses(&mut self, group_id: i64, expenses: Vec<Expense>) {
        self.expenses_by_group.insert(group_id, expenses);
    }

    /// Prepend an expense, keeping the newest-first order the service uses.
    pub fn insert_expense_front(&mut self, group_id: i64, expense: Expense) {
        self.expenses_by_group
            .entry(group_id)
            .or_default()
            .insert(0, expense);
    }

    pub fn remove_expense(&mut self, group_id: i64, expense_id: i64) {
        if let Some(expenses) = self.expenses_by_group.get_mut(&group_id) {
            expenses.retain(|e| e.id != expense_id);
        }
    }

    pub fn set_members(&mut self, group_id: i64, members: Vec<User>) {
        self.members_by_group.insert(group_id, members);
    }

    pub fn set_group_balance(&mut self, group_id: i64, balance: GroupBalance) {
        self.balances_by_group.insert(group_id, balance);
    }

    pub fn set_member_balance(&mut self, group_id: i64, user_id: i64, amount: f64) {
        self.member_balances.insert((group_id, user_id), amount);
    }

    pub fn set_user_balance_lines(&mut self, lines: Vec<BalanceLine>) {
        self.balance_lines = lines;
    }

    pub fn set_settlement_status(&mut self, group_id: i64, status: SettlementStatus) {
        self.settlement_by_group.insert(group_id, status);
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Record a user-facing error message. The most recent message replaces
    /// any previous one; there is no error history.
    pub fn set_error(&mut self, message: Option<String>) {
        self.last_error = message;
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    pub fn current_user(&self) -> &User {
        &self.current_user
    }

    pub fn current_group(&self) -> Option<&Group> {
        self.current_group.as_ref()
    }

    pub fn current_group_id(&self) -> Option<i64> {
        self.current_group.as_ref().map(|g| g.id)
    }

    pub fn groups(&self, status: GroupStatus) -> &[Group] {
        match status {
            GroupStatus::Active => &self.active_groups,
            GroupStatus::Settled => &self.settled_groups,
        }
    }

    pub fn expenses(&self, group_id: i64) -> &[Expense] {
        self.expenses_by_group
            .get(&group_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn members(&self, group_id: i64) -> &[User] {
        self.members_by_group
            .get(&group_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn group_balance(&self, group_id: i64) -> Option<&GroupBalance> {
        self.balances_by_group.get(&group_id)
    }

    pub fn member_balance(&self, group_id: i64, user_id: i64) -> Option<f64> {
        self.member_balances.get(&(group_id, user_id)).copied()
    }

    pub fn balance_lines(&self) -> &[BalanceLine] {
        &self.balance_lines
    }

    pub fn settlement_status(&self, group_id: i64) -> Option<&SettlementStatus> {
        self.settlement_by_group.get(&group_id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

// ============================================================================
// Tests
// ============================================================================
