//! The synchronization and reconciliation engine.
//!
//! `SyncEngine` owns the `LedgerCache` and is its only writer. Every
//! operation talks to the gateway, merges the response into the cache, and
//! catches its own errors at the boundary: a failed call stores one
//! human-readable message in the shared error slot and never aborts sibling
//! fetches it does not depend on. No operation retries automatically - the
//! worst outcome is stale or partially-missing cache data paired with an
//! error message for the triggering action.

use std::sync::{Mutex, MutexGuard};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::api::{ApiError, LedgerGateway};
use crate::cache::LedgerCache;
use crate::consensus;
use crate::models::{
    BalanceLine, Expense, ExpenseRequest, Group, GroupBalance, GroupStatus, SettlementStatus, User,
};

/// Orchestrates all traffic between the cache and the ledger service.
///
/// Operations take `&self`, so independent operations may run concurrently
/// from an `Arc<SyncEngine>`. The cache mutex is held only for synchronous
/// mutation, never across an await, which keeps the single-writer rule
/// intact while fetches overlap.
pub struct SyncEngine<G: LedgerGateway> {
    gateway: G,
    cache: Mutex<LedgerCache>,
}

impl<G: LedgerGateway> SyncEngine<G> {
    pub fn new(gateway: G, current_user: User) -> Self {
        Self {
            gateway,
            cache: Mutex::new(LedgerCache::new(current_user)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, LedgerCache> {
        // A poisoned lock means a panic mid-mutation; the cache holds only
        // re-fetchable data, so recover the guard and carry on.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a read against the current cache snapshot.
    pub fn with_cache<R>(&self, f: impl FnOnce(&LedgerCache) -> R) -> R {
        f(&self.cache())
    }

    fn record_error(&self, context: &str, err: &ApiError) {
        warn!(context, error = %err, "Ledger operation failed");
        self.cache().set_error(Some(format!("{}: {}", context, err)));
    }

    /// Apply a cache write only if `group_id` is still the current group.
    /// Guards a superseded group selection against writing stale results.
    fn apply_if_current(&self, group_id: i64, write: impl FnOnce(&mut LedgerCache)) {
        let mut cache = self.cache();
        if cache.current_group_id() == Some(group_id) {
            write(&mut cache);
        } else {
            debug!(group_id, "Discarding result for superseded group selection");
        }
    }

    // =========================================================================
    // Full passes
    // =========================================================================

    /// Fetch active groups and the cross-group balance summary, then select
    /// the first active group so its detail caches are warm. Safe to call
    /// repeatedly; the loading flag covers the whole pass.
    pub async fn load_initial_data(&self) {
        {
            let mut cache = self.cache();
            cache.set_loading(true);
            cache.clear_error();
        }

        self.load_active_groups().await;
        self.load_user_balance(GroupStatus::Active).await;

        let first = self.groups(GroupStatus::Active).into_iter().next();
        if let Some(group) = first {
            self.select_group(&group).await;
        }

        self.cache().set_loading(false);
    }

    /// Make `group` current and warm its detail caches.
    ///
    /// Expenses, members, and the current user's group balance are fetched
    /// concurrently; a failure of any one leg leaves the others intact.
    /// Per-member balances depend on the member list and go second. Results
    /// arriving after the current-group pointer has moved on are discarded.
    pub async fn select_group(&self, group: &Group) {
        let target = group.id;
        debug!(group_id = target, name = %group.name, "Selecting group");
        let user_id = self.current_user().id;
        self.cache().set_current_group(Some(group.clone()));

        let (expenses_res, members_res, balance_res) = tokio::join!(
            self.gateway.list_expenses(target),
            self.gateway.list_group_members(target),
            self.gateway.get_group_balance(target, user_id),
        );

        match expenses_res {
            Ok(expenses) => {
                self.apply_if_current(target, |c| c.replace_expenses(target, expenses))
            }
            Err(e) => self.record_error("Failed to load expenses", &e),
        }

        let members_loaded = match members_res {
            Ok(members) => {
                self.apply_if_current(target, |c| c.set_members(target, members));
                true
            }
            Err(e) => {
                self.record_error("Failed to load group members", &e);
                false
            }
        };

        match balance_res {
            Ok(balance) => {
                self.apply_if_current(target, |c| c.set_group_balance(target, balance))
            }
            Err(e) => self.record_error("Failed to load group balance", &e),
        }

        // Member balances need the member list; skip entirely when the list
        // failed or the selection was superseded while we were fetching.
        if members_loaded && self.cache().current_group_id() == Some(target) {
            self.member_balances_pass(target, true).await;
        }
    }

    // =========================================================================
    // Granular loaders
    // =========================================================================

    pub async fn load_groups(&self, status: GroupStatus) {
        let user_id = self.current_user().id;
        match self.gateway.list_groups(user_id, status).await {
            Ok(groups) => self.cache().set_groups(status, groups),
            Err(e) => self.record_error("Failed to load groups", &e),
        }
    }

    pub async fn load_active_groups(&self) {
        self.load_groups(GroupStatus::Active).await;
    }

    pub async fn load_settled_groups(&self) {
        self.load_groups(GroupStatus::Settled).await;
    }

    /// Refresh the cross-group balance summary for the current user.
    pub async fn load_user_balance(&self, status: GroupStatus) {
        let user_id = self.current_user().id;
        match self.gateway.get_user_balance(user_id, status).await {
            Ok(lines) => self.cache().set_user_balance_lines(lines),
            Err(e) => self.record_error("Failed to load balance summary", &e),
        }
    }

    pub async fn load_expenses(&self, group_id: i64) {
        match self.gateway.list_expenses(group_id).await {
            Ok(expenses) => self.cache().replace_expenses(group_id, expenses),
            Err(e) => self.record_error("Failed to load expenses", &e),
        }
    }

    pub async fn load_group_members(&self, group_id: i64) {
        match self.gateway.list_group_members(group_id).await {
            Ok(members) => self.cache().set_members(group_id, members),
            Err(e) => self.record_error("Failed to load group members", &e),
        }
    }

    /// Refresh the current user's net position within one group.
    pub async fn load_group_balance(&self, group_id: i64) {
        let user_id = self.current_user().id;
        match self.gateway.get_group_balance(group_id, user_id).await {
            Ok(balance) => self.cache().set_group_balance(group_id, balance),
            Err(e) => self.record_error("Failed to load group balance", &e),
        }
    }

    /// Fetch each member's net balance within `group_id`. The member list is
    /// a precondition: when absent it is loaded first, and if that fails the
    /// pass is a no-op beyond the recorded error.
    pub async fn load_member_balances(&self, group_id: i64) {
        self.member_balances_pass(group_id, false).await;
    }

    async fn member_balances_pass(&self, group_id: i64, only_if_current: bool) {
        let mut members = self.members_for(group_id);
        if members.is_empty() {
            self.load_group_members(group_id).await;
            members = self.members_for(group_id);
        }
        if members.is_empty() {
            return;
        }

        let fetches = members.iter().map(|member| {
            let member_id = member.id;
            async move {
                (
                    member_id,
                    self.gateway.get_group_balance(group_id, member_id).await,
                )
            }
        });

        for (member_id, result) in join_all(fetches).await {
            match result {
                Ok(balance) => {
                    let mut cache = self.cache();
                    if only_if_current && cache.current_group_id() != Some(group_id) {
                        debug!(group_id, member_id, "Discarding stale member balance");
                        continue;
                    }
                    cache.set_member_balance(group_id, member_id, balance.net);
                }
                Err(e) => self.record_error("Failed to load a member balance", &e),
            }
        }
    }

    pub async fn load_settlement_status(&self, group_id: i64) {
        match self.gateway.get_settlement_status(group_id).await {
            Ok(status) => self.cache().set_settlement_status(group_id, status),
            Err(e) => self.record_error("Failed to load settlement status", &e),
        }
    }

    // =========================================================================
    // Mutating actions
    // =========================================================================

    /// Record a new expense split evenly among all current members of the
    /// group (the participant list is the member id list).
    ///
    /// The service allocates the id and recomputes balances; the returned
    /// entity is inserted at the front of the cached list (newest first) and
    /// both balance views are then refreshed. If a refresh fails the new
    /// expense stays visible with stale balances until the next successful
    /// refresh.
    pub async fn add_expense(&self, group_id: i64, amount: f64, description: &str, paid_by: i64) {
        if self.members_for(group_id).is_empty() {
            self.load_group_members(group_id).await;
        }
        let members = self.members_for(group_id);
        if members.is_empty() {
            let err = ApiError::Precondition("group members could not be determined".to_string());
            self.record_error("Cannot add expense", &err);
            return;
        }

        let request = ExpenseRequest {
            group_id,
            paid_by,
            amount,
            description: description.to_string(),
            participant_ids: members.iter().map(|m| m.id).collect(),
        };

        match self.gateway.add_expense(&request).await {
            Ok(expense) => {
                debug!(group_id, expense_id = expense.id, "Expense recorded");
                self.cache().insert_expense_front(group_id, expense);
                self.load_group_balance(group_id).await;
                self.load_user_balance(GroupStatus::Active).await;
            }
            Err(e) => self.record_error("Failed to add expense", &e),
        }
    }

    /// Delete an expense and refresh both balance views, mirroring
    /// `add_expense`.
    pub async fn delete_expense(&self, expense: &Expense) {
        match self.gateway.delete_expense(expense.id).await {
            Ok(()) => {
                self.cache().remove_expense(expense.group_id, expense.id);
                self.load_group_balance(expense.group_id).await;
                self.load_user_balance(GroupStatus::Active).await;
            }
            Err(e) => self.record_error("Failed to delete expense", &e),
        }
    }

    /// Create a group and immediately select it so its detail caches are
    /// warm.
    pub async fn create_group(&self, name: &str, member_ids: &[i64]) {
        match self.gateway.create_group(name, member_ids).await {
            Ok(group) => {
                self.cache().upsert_group(group.clone());
                self.select_group(&group).await;
            }
            Err(e) => self.record_error("Failed to create group", &e),
        }
    }

    /// Record the current user's approval to settle a group, then re-fetch
    /// the settlement status and the active group list - the service may
    /// have flipped the group to settled once quorum was reached. Quorum is
    /// service-owned: no local state flips optimistically.
    pub async fn request_settle_group(&self, group_id: i64) {
        let user_id = self.current_user().id;
        match self.gateway.request_settle(group_id, user_id).await {
            Ok(()) => {
                self.load_settlement_status(group_id).await;
                self.load_active_groups().await;
            }
            Err(e) => self.record_error("Failed to request settlement", &e),
        }
    }

    /// Swap the current user. Balances are current-user-relative, so every
    /// user-scoped cache is dropped and must be re-fetched; group membership
    /// and expense lists are user-independent and survive.
    pub fn set_current_user(&self, user: User) {
        let mut cache = self.cache();
        cache.set_current_user(user);
        cache.clear_user_scoped();
    }

    /// Fetch the full user directory (e.g. the member picker when creating a
    /// group). Not cached; returns empty on failure with the error recorded.
    pub async fn list_users(&self) -> Vec<User> {
        match self.gateway.list_users().await {
            Ok(users) => users,
            Err(e) => {
                self.record_error("Failed to load users", &e);
                Vec::new()
            }
        }
    }

    pub fn clear_error(&self) {
        self.cache().clear_error();
    }

    // =========================================================================
    // Read accessors (cloned snapshots)
    // =========================================================================

    pub fn current_user(&self) -> User {
        self.cache().current_user().clone()
    }

    pub fn current_group(&self) -> Option<Group> {
        self.cache().current_group().cloned()
    }

    pub fn groups(&self, status: GroupStatus) -> Vec<Group> {
        self.cache().groups(status).to_vec()
    }

    pub fn expenses_for(&self, group_id: i64) -> Vec<Expense> {
        self.cache().expenses(group_id).to_vec()
    }

    pub fn members_for(&self, group_id: i64) -> Vec<User> {
        self.cache().members(group_id).to_vec()
    }

    pub fn group_balance(&self, group_id: i64) -> Option<GroupBalance> {
        self.cache().group_balance(group_id).cloned()
    }

    pub fn member_balance(&self, group_id: i64, user_id: i64) -> Option<f64> {
        self.cache().member_balance(group_id, user_id)
    }

    pub fn balance_lines(&self) -> Vec<BalanceLine> {
        self.cache().balance_lines().to_vec()
    }

    pub fn settlement_status(&self, group_id: i64) -> Option<SettlementStatus> {
        self.cache().settlement_status(group_id).cloned()
    }

    pub fn has_current_user_approved(&self, group_id: i64) -> bool {
        self.with_cache(|c| consensus::has_current_user_approved(c, group_id))
    }

    pub fn approval_progress(&self, group_id: i64) -> (i64, i64) {
        self.with_cache(|c| consensus::approval_progress(c, group_id))
    }

    pub fn is_loading(&self) -> bool {
        self.cache().is_loading()
    }

    pub fn last_error(&self) -> Option<String> {
        self.cache().last_error().map(str::to_string)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    use crate::api::ApiResult;

    fn user(id: i64, name: &str) -> User {
        User {
            id,
            name: name.to_string(),
        }
    }

    fn group(id: i64, name: &str, status: Option<GroupStatus>) -> Group {
        Group {
            id,
            name: name.to_string(),
            status,
        }
    }

    fn expense(id: i64, group_id: i64, paid_by: i64, amount: f64, description: &str) -> Expense {
        Expense {
            id,
            group_id,
            paid_by,
            amount,
            description: description.to_string(),
            created_at: "2025-09-28T12:00:00".to_string(),
        }
    }

    fn balance(net: f64) -> GroupBalance {
        GroupBalance { net, detail: vec![] }
    }

    /// Scriptable in-process gateway.
    ///
    /// `fail` holds operation names that should return a transport error;
    /// the optional gate delays `list_expenses` for one group until
    /// released, signalling `entered` when the call arrives.
    #[derive(Default)]
    struct MockGateway {
        groups: Mutex<Vec<Group>>,
        members: Mutex<HashMap<i64, Vec<User>>>,
        expenses: Mutex<HashMap<i64, Vec<Expense>>>,
        group_balances: Mutex<HashMap<(i64, i64), GroupBalance>>,
        user_balance: Mutex<Vec<BalanceLine>>,
        settlement: Mutex<HashMap<i64, SettlementStatus>>,
        users: Mutex<Vec<User>>,
        fail: Mutex<HashSet<&'static str>>,
        expense_gate: Mutex<Option<(i64, Arc<Notify>, Arc<Notify>)>>,
        next_expense_id: AtomicI64,
        /// Balances the "server" switches to after the next add_expense.
        balances_after_add: Mutex<HashMap<(i64, i64), GroupBalance>>,
    }

    impl MockGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                next_expense_id: AtomicI64::new(100),
                ..Self::default()
            })
        }

        fn fail_op(&self, name: &'static str) {
            self.fail.lock().unwrap().insert(name);
        }

        fn clear_fail(&self, name: &'static str) {
            self.fail.lock().unwrap().remove(name);
        }

        fn check(&self, name: &'static str) -> ApiResult<()> {
            if self.fail.lock().unwrap().contains(name) {
                Err(ApiError::Transport(format!("{} unreachable", name)))
            } else {
                Ok(())
            }
        }

        fn gate_expenses(&self, group_id: i64) -> (Arc<Notify>, Arc<Notify>) {
            let entered = Arc::new(Notify::new());
            let release = Arc::new(Notify::new());
            *self.expense_gate.lock().unwrap() =
                Some((group_id, entered.clone(), release.clone()));
            (entered, release)
        }
    }

    impl LedgerGateway for Arc<MockGateway> {
        async fn list_groups(&self, _user_id: i64, status: GroupStatus) -> ApiResult<Vec<Group>> {
            self.check("list_groups")?;
            Ok(self
                .groups
                .lock()
                .unwrap()
                .iter()
                .filter(|g| g.status.unwrap_or(GroupStatus::Active) == status)
                .cloned()
                .collect())
        }

        async fn create_group(&self, name: &str, member_ids: &[i64]) -> ApiResult<Group> {
            self.check("create_group")?;
            let id = 900;
            let created = group(id, name, None);
            self.groups.lock().unwrap().push(group(id, name, Some(GroupStatus::Active)));
            let users = self.users.lock().unwrap();
            let members: Vec<User> = users
                .iter()
                .filter(|u| member_ids.contains(&u.id))
                .cloned()
                .collect();
            self.members.lock().unwrap().insert(id, members);
            Ok(created)
        }

        async fn list_group_members(&self, group_id: i64) -> ApiResult<Vec<User>> {
            self.check("list_group_members")?;
            Ok(self
                .members
                .lock()
                .unwrap()
                .get(&group_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn request_settle(&self, group_id: i64, user_id: i64) -> ApiResult<()> {
            self.check("request_settle")?;
            let mut settlement = self.settlement.lock().unwrap();
            let members = self
                .members
                .lock()
                .unwrap()
                .get(&group_id)
                .cloned()
                .unwrap_or_default();
            let entry = settlement.entry(group_id).or_insert(SettlementStatus {
                approved_count: 0,
                total_members: members.len() as i64,
                approved_users: vec![],
            });
            if !entry.approved_users.iter().any(|u| u.id == user_id) {
                if let Some(approver) = members.iter().find(|u| u.id == user_id) {
                    entry.approved_users.push(approver.clone());
                    entry.approved_count += 1;
                }
            }
            // Quorum reached: the service flips the group to settled
            if entry.approved_count == entry.total_members {
                let mut groups = self.groups.lock().unwrap();
                if let Some(g) = groups.iter_mut().find(|g| g.id == group_id) {
                    g.status = Some(GroupStatus::Settled);
                }
            }
            Ok(())
        }

        async fn get_settlement_status(&self, group_id: i64) -> ApiResult<SettlementStatus> {
            self.check("get_settlement_status")?;
            self.settlement
                .lock()
                .unwrap()
                .get(&group_id)
                .cloned()
                .ok_or_else(|| ApiError::Http {
                    status: 404,
                    body: "no settlement request".to_string(),
                })
        }

        async fn list_expenses(&self, group_id: i64) -> ApiResult<Vec<Expense>> {
            self.check("list_expenses")?;
            let gate = {
                let gate = self.expense_gate.lock().unwrap();
                match gate.as_ref() {
                    Some((gated_group, entered, release)) if *gated_group == group_id => {
                        Some((entered.clone(), release.clone()))
                    }
                    _ => None,
                }
            };
            if let Some((entered, release)) = gate {
                entered.notify_one();
                release.notified().await;
            }
            Ok(self
                .expenses
                .lock()
                .unwrap()
                .get(&group_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn add_expense(&self, request: &ExpenseRequest) -> ApiResult<Expense> {
            self.check("add_expense")?;
            let id = self.next_expense_id.fetch_add(1, Ordering::SeqCst);
            let created = expense(
                id,
                request.group_id,
                request.paid_by,
                request.amount,
                &request.description,
            );
            self.expenses
                .lock()
                .unwrap()
                .entry(request.group_id)
                .or_default()
                .insert(0, created.clone());
            // Swap in the scripted post-add balances
            let after: Vec<((i64, i64), GroupBalance)> =
                self.balances_after_add.lock().unwrap().drain().collect();
            self.group_balances.lock().unwrap().extend(after);
            Ok(created)
        }

        async fn delete_expense(&self, expense_id: i64) -> ApiResult<()> {
            self.check("delete_expense")?;
            for expenses in self.expenses.lock().unwrap().values_mut() {
                expenses.retain(|e| e.id != expense_id);
            }
            Ok(())
        }

        async fn get_group_balance(&self, group_id: i64, user_id: i64) -> ApiResult<GroupBalance> {
            self.check("get_group_balance")?;
            Ok(self
                .group_balances
                .lock()
                .unwrap()
                .get(&(group_id, user_id))
                .cloned()
                .unwrap_or(GroupBalance {
                    net: 0.0,
                    detail: vec![],
                }))
        }

        async fn get_user_balance(
            &self,
            _user_id: i64,
            _status: GroupStatus,
        ) -> ApiResult<Vec<BalanceLine>> {
            self.check("get_user_balance")?;
            Ok(self.user_balance.lock().unwrap().clone())
        }

        async fn list_users(&self) -> ApiResult<Vec<User>> {
            self.check("list_users")?;
            Ok(self.users.lock().unwrap().clone())
        }
    }

    /// A mock preloaded with the Ski Trip scenario: group 5 with Andy (1)
    /// and Sam (2), one existing expense.
    fn ski_trip_mock() -> Arc<MockGateway> {
        let mock = MockGateway::new();
        *mock.groups.lock().unwrap() = vec![group(5, "Ski Trip", Some(GroupStatus::Active))];
        *mock.users.lock().unwrap() = vec![user(1, "Andy"), user(2, "Sam")];
        mock.members
            .lock()
            .unwrap()
            .insert(5, vec![user(1, "Andy"), user(2, "Sam")]);
        mock.expenses
            .lock()
            .unwrap()
            .insert(5, vec![expense(10, 5, 2, 60.0, "Dinner")]);
        mock.group_balances
            .lock()
            .unwrap()
            .insert((5, 1), balance(-30.0));
        mock.group_balances
            .lock()
            .unwrap()
            .insert((5, 2), balance(30.0));
        *mock.user_balance.lock().unwrap() = vec![BalanceLine {
            group_id: 5,
            group_name: "Ski Trip".to_string(),
            counterparty: "Sam".to_string(),
            amount: -30.0,
        }];
        mock
    }

    fn engine(mock: &Arc<MockGateway>) -> SyncEngine<Arc<MockGateway>> {
        SyncEngine::new(mock.clone(), user(1, "Andy"))
    }

    #[tokio::test]
    async fn test_initial_load_selects_first_group_and_warms_caches() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);

        engine.load_initial_data().await;

        assert!(!engine.is_loading());
        assert!(engine.last_error().is_none());
        assert_eq!(engine.current_group().map(|g| g.id), Some(5));
        assert_eq!(engine.expenses_for(5).len(), 1);
        assert_eq!(engine.members_for(5).len(), 2);
        assert_eq!(engine.group_balance(5).map(|b| b.net), Some(-30.0));
        assert_eq!(engine.member_balance(5, 2), Some(30.0));
        assert_eq!(engine.balance_lines().len(), 1);
    }

    #[tokio::test]
    async fn test_select_group_failures_are_independent() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);

        mock.fail_op("list_expenses");
        engine.select_group(&group(5, "Ski Trip", Some(GroupStatus::Active))).await;

        // The failed leg is empty, the others populated
        assert!(engine.expenses_for(5).is_empty());
        assert_eq!(engine.members_for(5).len(), 2);
        assert_eq!(engine.group_balance(5).map(|b| b.net), Some(-30.0));
        assert_eq!(engine.member_balance(5, 1), Some(-30.0));
        assert!(engine.last_error().is_some());
    }

    #[tokio::test]
    async fn test_member_balances_skipped_when_members_fail() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);

        mock.fail_op("list_group_members");
        engine.select_group(&group(5, "Ski Trip", Some(GroupStatus::Active))).await;

        // Members and the dependent member balances are absent
        assert!(engine.members_for(5).is_empty());
        assert!(engine.member_balance(5, 1).is_none());
        // Independent legs still landed
        assert_eq!(engine.expenses_for(5).len(), 1);
        assert_eq!(engine.group_balance(5).map(|b| b.net), Some(-30.0));
    }

    #[tokio::test]
    async fn test_superseded_select_discards_stale_results() {
        let mock = ski_trip_mock();
        mock.groups
            .lock()
            .unwrap()
            .push(group(6, "Road Trip", Some(GroupStatus::Active)));
        mock.members.lock().unwrap().insert(6, vec![user(1, "Andy")]);
        mock.expenses
            .lock()
            .unwrap()
            .insert(6, vec![expense(20, 6, 1, 40.0, "Fuel")]);

        let engine = Arc::new(engine(&mock));
        let (entered, release) = mock.gate_expenses(5);

        let first = {
            let engine = engine.clone();
            let target = group(5, "Ski Trip", Some(GroupStatus::Active));
            tokio::spawn(async move { engine.select_group(&target).await })
        };

        // Wait until the first selection is parked inside its expense fetch,
        // then supersede it.
        entered.notified().await;
        engine
            .select_group(&group(6, "Road Trip", Some(GroupStatus::Active)))
            .await;
        release.notify_one();
        first.await.expect("first selection task panicked");

        // The superseded selection wrote nothing
        assert_eq!(engine.current_group().map(|g| g.id), Some(6));
        assert!(engine.expenses_for(5).is_empty());
        assert!(engine.members_for(5).is_empty());
        // The winning selection is fully populated
        assert_eq!(engine.expenses_for(6).len(), 1);
        assert_eq!(engine.members_for(6).len(), 1);
    }

    #[tokio::test]
    async fn test_add_expense_stores_server_entity_and_refreshed_balance() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);
        engine.load_initial_data().await;

        // The service will report an even split of the new expense:
        // Andy paid 100 for both, so Sam owes him 50 on top of the prior -30.
        mock.balances_after_add.lock().unwrap().insert(
            (5, 1),
            GroupBalance {
                net: 20.0,
                detail: vec![crate::models::BalanceDetail {
                    counterparty: "Sam".to_string(),
                    amount: 20.0,
                }],
            },
        );

        engine.add_expense(5, 100.0, "Lift pass", 1).await;

        let expenses = engine.expenses_for(5);
        assert_eq!(expenses[0].description, "Lift pass");
        assert_eq!(expenses[0].id, 100); // server-allocated id, newest first
        // The cached balance is exactly the value the service returned
        assert_eq!(engine.group_balance(5).map(|b| b.net), Some(20.0));
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn test_add_expense_loads_members_first() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);
        // No select_group: members are not cached yet

        engine.add_expense(5, 100.0, "Lift pass", 1).await;

        assert_eq!(engine.members_for(5).len(), 2);
        assert_eq!(engine.expenses_for(5).len(), 1);
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn test_add_expense_precondition_error_without_members() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);
        mock.fail_op("list_group_members");

        engine.add_expense(5, 100.0, "Lift pass", 1).await;

        // Nothing was sent, cache unchanged, error surfaced
        assert!(engine.expenses_for(5).is_empty());
        let error = engine.last_error().expect("expected a recorded error");
        assert!(error.contains("Cannot add expense"));
    }

    #[tokio::test]
    async fn test_add_failure_leaves_cache_unchanged() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);
        engine.load_initial_data().await;
        let before: Vec<i64> = engine.expenses_for(5).iter().map(|e| e.id).collect();

        mock.fail_op("add_expense");
        engine.add_expense(5, 100.0, "Lift pass", 1).await;

        let after: Vec<i64> = engine.expenses_for(5).iter().map(|e| e.id).collect();
        assert_eq!(before, after);
        assert!(engine.last_error().is_some());
    }

    #[tokio::test]
    async fn test_balance_refresh_failure_keeps_expense_with_stale_balance() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);
        engine.load_initial_data().await;

        mock.fail_op("get_group_balance");
        engine.add_expense(5, 100.0, "Lift pass", 1).await;

        // Expense landed; balance is the stale pre-add value
        assert_eq!(engine.expenses_for(5)[0].description, "Lift pass");
        assert_eq!(engine.group_balance(5).map(|b| b.net), Some(-30.0));
        assert!(engine.last_error().is_some());
    }

    #[tokio::test]
    async fn test_add_then_delete_round_trips_expense_ids() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);
        engine.load_initial_data().await;
        let before: HashSet<i64> = engine.expenses_for(5).iter().map(|e| e.id).collect();

        engine.add_expense(5, 100.0, "Lift pass", 1).await;
        let added = engine.expenses_for(5)[0].clone();
        engine.delete_expense(&added).await;

        let after: HashSet<i64> = engine.expenses_for(5).iter().map(|e| e.id).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_create_group_appends_and_selects() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);

        engine.create_group("Road Trip", &[1, 2]).await;

        let active = engine.groups(GroupStatus::Active);
        assert!(active.iter().any(|g| g.name == "Road Trip"));
        assert_eq!(engine.current_group().map(|g| g.name), Some("Road Trip".to_string()));
        // Detail caches are warm for the new group
        assert_eq!(engine.members_for(900).len(), 2);
    }

    #[tokio::test]
    async fn test_no_premature_quorum_flip_before_refetch() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);
        engine.select_group(&group(5, "Ski Trip", Some(GroupStatus::Active))).await;

        // Previously fetched status: nobody has approved yet
        mock.settlement.lock().unwrap().insert(
            5,
            SettlementStatus {
                approved_count: 0,
                total_members: 2,
                approved_users: vec![],
            },
        );
        engine.load_settlement_status(5).await;
        assert!(!engine.has_current_user_approved(5));

        // The approval POST succeeds but the status re-fetch fails: the old
        // cached status still governs reads - no optimistic flip.
        mock.fail_op("get_settlement_status");
        engine.request_settle_group(5).await;
        assert!(!engine.has_current_user_approved(5));
        assert_eq!(engine.approval_progress(5), (0, 2));

        // Once the re-fetch succeeds the approval becomes visible
        mock.clear_fail("get_settlement_status");
        engine.load_settlement_status(5).await;
        assert!(engine.has_current_user_approved(5));
        assert_eq!(engine.approval_progress(5), (1, 2));
    }

    #[tokio::test]
    async fn test_full_quorum_settles_group_on_refetch() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);

        engine.request_settle_group(5).await;
        // Sam approves out of band; the service flips the group
        mock.request_settle(5, 2).await.expect("mock settle failed");

        engine.request_settle_group(5).await; // idempotent re-approval + refresh
        assert!(engine.groups(GroupStatus::Active).is_empty());

        engine.load_settled_groups().await;
        let settled = engine.groups(GroupStatus::Settled);
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].status, Some(GroupStatus::Settled));
    }

    #[tokio::test]
    async fn test_user_switch_drops_user_scoped_caches() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);
        engine.load_initial_data().await;
        assert!(engine.group_balance(5).is_some());

        engine.set_current_user(user(2, "Sam"));

        // Current-user-relative caches must be re-fetched, not reused
        assert!(engine.group_balance(5).is_none());
        assert!(engine.member_balance(5, 1).is_none());
        assert!(engine.balance_lines().is_empty());
        // User-independent caches survive
        assert_eq!(engine.expenses_for(5).len(), 1);
        assert_eq!(engine.members_for(5).len(), 2);

        engine.load_group_balance(5).await;
        assert_eq!(engine.group_balance(5).map(|b| b.net), Some(30.0));
    }

    #[tokio::test]
    async fn test_settlement_status_invariant_holds_for_cached_statuses() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);
        engine.request_settle_group(5).await;

        let status = engine.settlement_status(5).expect("status not cached");
        assert!(status.is_consistent());
    }

    #[tokio::test]
    async fn test_repeated_initial_load_is_idempotent() {
        let mock = ski_trip_mock();
        let engine = engine(&mock);

        engine.load_initial_data().await;
        engine.load_initial_data().await;

        assert_eq!(engine.groups(GroupStatus::Active).len(), 1);
        assert_eq!(engine.expenses_for(5).len(), 1);
        assert!(!engine.is_loading());
    }
}
