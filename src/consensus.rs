//! Settlement-approval projections.
//!
//! Quorum is entirely service-determined: these functions only project the
//! cached `SettlementStatus` for display, and the engine re-fetches it after
//! every approval action. The client never computes whether a group should
//! settle, so client and service cannot disagree about settlement
//! completion.

use crate::cache::LedgerCache;

/// Whether the current user has an approval on record for this group.
///
/// Returns false (not "unknown") when the status has never been fetched;
/// callers gating UI actions on this must fetch the status first.
pub fn has_current_user_approved(cache: &LedgerCache, group_id: i64) -> bool {
    let user_id = cache.current_user().id;
    cache
        .settlement_status(group_id)
        .map(|status| status.approved_users.iter().any(|u| u.id == user_id))
        .unwrap_or(false)
}

/// Approval progress as `(approved, total members)`. `(0, 0)` until the
/// status has been fetched.
pub fn approval_progress(cache: &LedgerCache, group_id: i64) -> (i64, i64) {
    cache
        .settlement_status(group_id)
        .map(|status| (status.approved_count, status.total_members))
        .unwrap_or((0, 0))
}
