//! In-memory ledger cache.
//!
//! This module provides the `LedgerCache` holding the latest known snapshot
//! of every ledger entity. The cache performs no I/O and persists nothing:
//! it starts empty on process start and is populated exclusively by the
//! synchronization engine.

pub mod store;

pub use store::LedgerCache;
