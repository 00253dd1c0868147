//! The background worker loop (§4.5): drains `LOG_QUEUE`, sweeps
//! unprocessed logs into credit deductions/usage increments, and drives
//! card-on-file auto top-ups. A `tokio::select!` over an interval tick
//! and a `CancellationToken`, so shutdown is cooperative rather than
//! polled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use gateway_core::log::{Log, Lock, RetentionLevel, Transaction, TransactionKind, TransactionStatus};

use crate::fees::calculate_fees;
use crate::queue::LogQueue;
use crate::store::UsageStore;
use crate::stripe::{CreatePaymentIntentRequest, StripeClient};

/// How often the most recent `credit_topup` transaction is allowed to
/// suppress a new auto-top-up attempt (§4.5: "within the last hour").
const TOPUP_RETRY_WINDOW_SECS: i64 = 3600;

/// Tunables for the worker's tick cadence, read once at startup from
/// [`gateway_config::GatewayEnv`] (kept here, not there, so this crate
/// doesn't depend upward on the store crate).
#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    /// Base tick period; one tick drains the queue (§4.5 "Infinite tick
    /// at 1s").
    pub tick_interval: Duration,
    /// Run `batchProcessLogs` every this many ticks.
    pub batch_processing_interval_ticks: u32,
    /// Run `processAutoTopUp` every this many ticks (120 in production,
    /// 5 in development, per §4.5).
    pub auto_topup_interval_ticks: u32,
    /// Row cap per `batchProcessLogs` sweep.
    pub batch_size: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            batch_processing_interval_ticks: 5,
            auto_topup_interval_ticks: 120,
            batch_size: 100,
        }
    }
}

/// Drives the queue-drain / credit-sweep / auto-top-up cadence against a
/// store and a Stripe client, both behind traits so the worker never
/// depends on the concrete `SQLite` or HTTP implementations.
pub struct Worker<S, C> {
    store: Arc<S>,
    queue: Arc<LogQueue>,
    stripe: C,
    config: WorkerConfig,
}

impl<S, C> Worker<S, C>
where
    S: UsageStore,
    C: StripeClient,
{
    #[must_use]
    pub fn new(store: Arc<S>, queue: Arc<LogQueue>, stripe: C, config: WorkerConfig) -> Self {
        Self { store, queue, stripe, config }
    }

    /// Run until `cancel` fires. On cancellation the current tick is
    /// allowed to finish and the loop exits; the caller (§5 "Worker
    /// shutdown") is responsible for bounding that wait (15s) and
    /// force-stopping if the task doesn't join in time.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        let mut tick_count: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick_count += 1;
                    self.drain_queue();

                    if tick_count % u64::from(self.config.batch_processing_interval_ticks.max(1)) == 0 {
                        self.batch_process_logs();
                    }
                    if tick_count % u64::from(self.config.auto_topup_interval_ticks.max(1)) == 0 {
                        self.process_auto_topup().await;
                    }
                }
                () = cancel.cancelled() => {
                    info!("usage worker shutting down");
                    return;
                }
            }
        }
    }

    /// §4.5 worker step 1: consume one batch and bulk-insert it. Content
    /// stripping for retention-`none` organisations happens once, at
    /// enqueue time in the request handler (it knows the organisation;
    /// the queue and the worker deliberately don't), so there is
    /// nothing left to redact here.
    fn drain_queue(&self) {
        let logs = self.queue.drain(self.config.batch_size as usize);
        if logs.is_empty() {
            return;
        }
        self.store.insert_logs(&logs);
    }

    /// `batchProcessLogs` (§4.5): lock, sweep, release. Lock contention
    /// (another replica already holds it) and sweep failures are both
    /// logged and tolerated — the batch is retried on the next
    /// scheduled tick.
    fn batch_process_logs(&self) {
        if !self.store.try_acquire_lock(Lock::CREDIT_PROCESSING) {
            return;
        }
        let outcome = self.store.batch_process_logs(self.config.batch_size);
        if outcome.processed > 0 {
            info!(processed = outcome.processed, "batch_process_logs swept logs");
        }
        self.store.release_lock(Lock::CREDIT_PROCESSING);
    }

    /// `processAutoTopUp` (§4.5): for every eligible organisation, skip
    /// if a recent attempt is still in flight, otherwise open a
    /// `pending` transaction and ask Stripe to charge the card
    /// off-session. Credits are added only once the (out-of-core-scope)
    /// webhook confirms payment.
    async fn process_auto_topup(&self) {
        if !self.store.try_acquire_lock(Lock::AUTO_TOPUP_CHECK) {
            return;
        }

        for org in self.store.organizations_needing_topup() {
            if self.recent_topup_in_flight(&org.id) {
                continue;
            }

            let fees = calculate_fees(org.auto_top_up_amount, None);
            let transaction = Transaction {
                id: Uuid::now_v7().to_string(),
                organization_id: org.id.clone(),
                kind: TransactionKind::CreditTopup,
                credit_amount: fees.credit_amount,
                amount: fees.charge_amount,
                currency: "usd".to_string(),
                status: TransactionStatus::Pending,
                stripe_payment_intent_id: None,
                created_at: Utc::now(),
            };
            self.store.create_transaction(&transaction);

            let Some(customer_id) = org.stripe_customer_id.clone() else {
                warn!(organization_id = %org.id, "auto top-up eligible org has no stripe customer id");
                self.store.update_transaction_status(&transaction.id, TransactionStatus::Failed, None);
                continue;
            };

            #[allow(clippy::cast_possible_truncation)]
            let amount_cents = (fees.charge_amount * 100.0).round() as i64;
            let request = CreatePaymentIntentRequest {
                customer_id,
                amount_cents,
                currency: transaction.currency.clone(),
            };

            match self.stripe.create_payment_intent(&request).await {
                Ok(intent) => {
                    self.store.update_transaction_status(&transaction.id, TransactionStatus::Pending, Some(&intent.id));
                }
                Err(err) => {
                    warn!(organization_id = %org.id, %err, "auto top-up stripe call failed");
                    self.store.update_transaction_status(&transaction.id, TransactionStatus::Failed, None);
                }
            }
        }

        self.store.release_lock(Lock::AUTO_TOPUP_CHECK);
    }

    fn recent_topup_in_flight(&self, organization_id: &str) -> bool {
        let Some(last) = self.store.latest_transaction(organization_id) else {
            return false;
        };
        if last.kind != TransactionKind::CreditTopup {
            return false;
        }
        let within_window = (Utc::now() - last.created_at).num_seconds() < TOPUP_RETRY_WINDOW_SECS;
        within_window && matches!(last.status, TransactionStatus::Pending | TransactionStatus::Failed)
    }
}
