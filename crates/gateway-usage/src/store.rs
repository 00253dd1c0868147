//! Storage lookups the worker needs (§4.5). Kept as a trait for the same
//! layering reason as `gateway-router::keys::KeySource` and
//! `gateway-admission::AdmissionStore`: the worker sits below
//! `gateway-config` in the dependency order (§2), so it cannot depend on
//! the concrete `SQLite` store directly.

use std::collections::HashMap;

use gateway_core::entities::Organization;
use gateway_core::log::{Log, Transaction, TransactionStatus};

/// Outcome of one `batch_process_logs` sweep: how many rows were marked
/// processed, and the per-organization/per-key deltas the caller already
/// applied to its own tables (the worker surfaces these only for
/// logging/metrics; the store has already committed them).
#[derive(Debug, Default)]
pub struct BatchProcessOutcome {
    pub processed: usize,
    pub organization_deductions: HashMap<String, f64>,
    pub api_key_increments: HashMap<String, f64>,
}

/// Everything the worker reads and writes against the store.
pub trait UsageStore: Send + Sync {
    fn try_acquire_lock(&self, key: &str) -> bool;
    fn release_lock(&self, key: &str);

    fn insert_logs(&self, logs: &[Log]);

    /// The atomic sweep described in spec.md §4.5 steps 2-5 (the lock
    /// acquire/release bracketing it is the worker's concern, via
    /// `try_acquire_lock`/`release_lock` above).
    fn batch_process_logs(&self, batch_size: u32) -> BatchProcessOutcome;

    fn organizations_needing_topup(&self) -> Vec<Organization>;
    fn latest_transaction(&self, organization_id: &str) -> Option<Transaction>;
    fn create_transaction(&self, transaction: &Transaction);
    fn update_transaction_status(&self, id: &str, status: TransactionStatus, stripe_payment_intent_id: Option<&str>);
}
