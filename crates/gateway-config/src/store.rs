//! The opaque relational store (§3): reference entities (organizations,
//! projects, api keys, provider keys, custom providers) plus the
//! append-only `logs`/`transactions`/`locks` tables the worker drives.
//!
//! Every method takes a pooled connection for its own query — callers on
//! the async server wrap these in `spawn_blocking`, matching how
//! `rusqlite`'s synchronous API is used elsewhere in the workspace.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::warn;

use gateway_core::entities::{ApiKey, CustomProvider, Organization, Project, ProviderKey};
use gateway_core::log::{KeyStatus, Log, Plan, ProjectMode, RetentionLevel, Transaction, TransactionKind, TransactionStatus};
use gateway_router::keys::{CustomProviderRef, KeySource, ProviderKeyRef};

use crate::error::{Result, StoreError};
use crate::pool::ConnectionPool;

/// The gateway's store, backed by one `SQLite` connection pool.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations. Call once at startup.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.pool.get()?;
        crate::migrations::run_migrations(&conn)?;
        Ok(())
    }

    // ── Organizations ───────────────────────────────────────────────

    pub fn create_organization(&self, org: &Organization) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO organizations (id, plan, credits, auto_top_up_enabled, auto_top_up_threshold, auto_top_up_amount, stripe_customer_id, retention_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                org.id,
                plan_to_str(org.plan),
                org.credits,
                org.auto_top_up_enabled,
                org.auto_top_up_threshold,
                org.auto_top_up_amount,
                org.stripe_customer_id,
                retention_to_str(org.retention_level),
            ],
        )?;
        Ok(())
    }

    pub fn organization(&self, id: &str) -> Result<Option<Organization>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, plan, credits, auto_top_up_enabled, auto_top_up_threshold, auto_top_up_amount, stripe_customer_id, retention_level
             FROM organizations WHERE id = ?1",
            [id],
            row_to_organization,
        )
        .optional()
        .map_err(StoreError::from)
    }

    // ── Projects ─────────────────────────────────────────────────────

    pub fn create_project(&self, project: &Project) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO projects (id, organization_id, mode, caching_enabled, cache_duration_seconds) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.organization_id,
                mode_to_str(project.mode),
                project.caching_enabled,
                project.cache_duration_seconds,
            ],
        )?;
        Ok(())
    }

    pub fn project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, organization_id, mode, caching_enabled, cache_duration_seconds FROM projects WHERE id = ?1",
            [id],
            row_to_project,
        )
        .optional()
        .map_err(StoreError::from)
    }

    // ── API keys ────────────────────────────────────────────────────

    pub fn create_api_key(&self, key: &ApiKey) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO api_keys (id, token, project_id, status, usage, usage_limit) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![key.id, key.token, key.project_id, key_status_to_str(key.status), key.usage, key.usage_limit],
        )?;
        Ok(())
    }

    pub fn api_key_by_token(&self, token: &str) -> Result<Option<ApiKey>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, token, project_id, status, usage, usage_limit FROM api_keys WHERE token = ?1",
            [token],
            row_to_api_key,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Increment one key's lifetime usage by `amount` (worker-only write).
    pub fn increment_api_key_usage(&self, key_id: &str, amount: f64) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("UPDATE api_keys SET usage = usage + ?1 WHERE id = ?2", params![amount, key_id])?;
        Ok(())
    }

    // ── Provider keys / custom providers ───────────────────────────

    pub fn create_provider_key(&self, key: &ProviderKey) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO provider_keys (id, organization_id, provider, token, base_url, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![key.id, key.organization_id, key.provider, key.token, key.base_url, key_status_to_str(key.status)],
        )?;
        Ok(())
    }

    pub fn provider_key(&self, organization_id: &str, provider: &str) -> Result<Option<ProviderKey>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, organization_id, provider, token, base_url, status FROM provider_keys
             WHERE organization_id = ?1 AND provider = ?2 AND status = 'active'",
            params![organization_id, provider],
            row_to_provider_key,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn create_custom_provider(&self, custom: &CustomProvider) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO custom_providers (organization_id, name, base_url, token) VALUES (?1, ?2, ?3, ?4)",
            params![custom.organization_id, custom.name, custom.base_url, custom.token],
        )?;
        Ok(())
    }

    pub fn custom_provider(&self, organization_id: &str, name: &str) -> Result<Option<CustomProvider>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT organization_id, name, base_url, token FROM custom_providers WHERE organization_id = ?1 AND name = ?2",
            params![organization_id, name],
            row_to_custom_provider,
        )
        .optional()
        .map_err(StoreError::from)
    }

    // ── Logs ────────────────────────────────────────────────────────

    pub fn insert_log(&self, log: &Log) -> Result<()> {
        let conn = self.pool.get()?;
        insert_log_with(&conn, log)
    }

    /// Batch-insert logs drained from the queue (worker step 1).
    pub fn insert_logs(&self, logs: &[Log]) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for log in logs {
            insert_log_with(&tx, log)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// The atomic worker sweep (§4.5 `batchProcessLogs`, steps 2-5; the
    /// lock in step 1 and release in step 6 are [`crate::lock::Lock`]'s
    /// concern, not the store's).
    pub fn batch_process_logs(&self, batch_size: u32) -> Result<BatchProcessOutcome> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let request_ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT request_id FROM logs WHERE processed_at IS NULL ORDER BY created_at ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map([batch_size], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        if request_ids.is_empty() {
            tx.commit()?;
            return Ok(BatchProcessOutcome::default());
        }

        let placeholders = request_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");

        // Per-organization cost: only credits-mode, non-cached, positive-cost rows.
        let mut org_costs: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
        {
            let sql = format!(
                "SELECT organization_id, cost FROM logs WHERE request_id IN ({placeholders}) AND used_mode = 'credits' AND cached = 0 AND cost > 0"
            );
            let mut stmt = tx.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = request_ids.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(params.as_slice(), |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
            for row in rows {
                let (org_id, cost) = row?;
                *org_costs.entry(org_id).or_insert(0.0) += cost;
            }
        }

        // Per-ApiKey cost: all non-cached, positive-cost rows.
        let mut key_costs: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
        {
            let sql = format!(
                "SELECT api_key_id, cost FROM logs WHERE request_id IN ({placeholders}) AND cached = 0 AND cost > 0"
            );
            let mut stmt = tx.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = request_ids.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(params.as_slice(), |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
            for row in rows {
                let (key_id, cost) = row?;
                *key_costs.entry(key_id).or_insert(0.0) += cost;
            }
        }

        for (org_id, cost) in &org_costs {
            tx.execute("UPDATE organizations SET credits = credits - ?1 WHERE id = ?2", params![cost, org_id])?;
        }
        for (key_id, cost) in &key_costs {
            tx.execute("UPDATE api_keys SET usage = usage + ?1 WHERE id = ?2", params![cost, key_id])?;
        }

        let now = Utc::now().to_rfc3339();
        {
            let sql = format!("UPDATE logs SET processed_at = ?1 WHERE request_id IN ({placeholders})");
            let mut params: Vec<&dyn rusqlite::ToSql> = vec![&now];
            params.extend(request_ids.iter().map(|s| s as &dyn rusqlite::ToSql));
            tx.execute(&sql, params.as_slice())?;
        }

        tx.commit()?;

        Ok(BatchProcessOutcome {
            processed: request_ids.len(),
            organization_deductions: org_costs,
            api_key_increments: key_costs,
        })
    }

    // ── Transactions ────────────────────────────────────────────────

    pub fn create_transaction(&self, txn: &Transaction) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO transactions (id, organization_id, kind, credit_amount, amount, currency, status, stripe_payment_intent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                txn.id,
                txn.organization_id,
                "credit_topup",
                txn.credit_amount,
                txn.amount,
                txn.currency,
                transaction_status_to_str(txn.status),
                txn.stripe_payment_intent_id,
                txn.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_transaction_status(&self, id: &str, status: TransactionStatus, stripe_payment_intent_id: Option<&str>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE transactions SET status = ?1, stripe_payment_intent_id = COALESCE(?2, stripe_payment_intent_id) WHERE id = ?3",
            params![transaction_status_to_str(status), stripe_payment_intent_id, id],
        )?;
        Ok(())
    }

    /// Most recent `credit_topup` transaction for an organization, if any.
    pub fn latest_transaction(&self, organization_id: &str) -> Result<Option<Transaction>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, organization_id, kind, credit_amount, amount, currency, status, stripe_payment_intent_id, created_at
             FROM transactions WHERE organization_id = ?1 ORDER BY created_at DESC LIMIT 1",
            [organization_id],
            row_to_transaction,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Organizations eligible for an auto-top-up check (§4.5
    /// `processAutoTopUp`): enabled, and below their threshold.
    pub fn organizations_needing_topup(&self) -> Result<Vec<Organization>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, plan, credits, auto_top_up_enabled, auto_top_up_threshold, auto_top_up_amount, stripe_customer_id, retention_level
             FROM organizations WHERE auto_top_up_enabled = 1 AND credits < auto_top_up_threshold",
        )?;
        let rows = stmt.query_map([], row_to_organization)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn add_credits(&self, organization_id: &str, amount: f64) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("UPDATE organizations SET credits = credits + ?1 WHERE id = ?2", params![amount, organization_id])?;
        Ok(())
    }

    // ── Locks ───────────────────────────────────────────────────────

    /// Try to acquire a named worker lock (see [`crate::lock`]).
    pub fn try_acquire_lock(&self, key: &str) -> Result<bool> {
        crate::lock::try_acquire(&self.pool, key)
    }

    pub fn release_lock(&self, key: &str) -> Result<()> {
        crate::lock::release(&self.pool, key)
    }
}

/// Result of one `batch_process_logs` sweep, surfaced for worker logging
/// and tests. Shared with `gateway-usage`, whose `UsageStore` trait this
/// `impl` block below satisfies, so the worker and the store agree on
/// one shape for the sweep's outcome.
pub use gateway_usage::store::BatchProcessOutcome;

impl gateway_admission::AdmissionStore for Store {
    fn api_key_by_token(&self, token: &str) -> Option<ApiKey> {
        self.api_key_by_token(token).ok().flatten()
    }

    fn project(&self, id: &str) -> Option<Project> {
        self.project(id).ok().flatten()
    }

    fn organization(&self, id: &str) -> Option<Organization> {
        self.organization(id).ok().flatten()
    }

    fn custom_provider_exists(&self, organization_id: &str, name: &str) -> bool {
        self.custom_provider(organization_id, name).ok().flatten().is_some()
    }
}

impl KeySource for Store {
    fn provider_key(&self, organization_id: &str, provider_id: &str) -> Option<ProviderKeyRef> {
        self.provider_key(organization_id, provider_id)
            .ok()
            .flatten()
            .map(|k| ProviderKeyRef { token: k.token, base_url: k.base_url })
    }

    fn custom_provider(&self, organization_id: &str, name: &str) -> Option<CustomProviderRef> {
        self.custom_provider(organization_id, name)
            .ok()
            .flatten()
            .map(|c| CustomProviderRef { token: c.token, base_url: c.base_url })
    }
}

// `UsageStore`'s methods return no `Result`: the worker runs on a
// best-effort tick loop and logs its own failures rather than
// propagating them, so storage errors here are logged and swallowed.
impl gateway_usage::store::UsageStore for Store {
    fn try_acquire_lock(&self, key: &str) -> bool {
        self.try_acquire_lock(key).unwrap_or_else(|err| {
            warn!(%err, key, "try_acquire_lock failed");
            false
        })
    }

    fn release_lock(&self, key: &str) {
        if let Err(err) = self.release_lock(key) {
            warn!(%err, key, "release_lock failed");
        }
    }

    fn insert_logs(&self, logs: &[Log]) {
        if let Err(err) = self.insert_logs(logs) {
            warn!(%err, count = logs.len(), "insert_logs failed");
        }
    }

    fn batch_process_logs(&self, batch_size: u32) -> BatchProcessOutcome {
        self.batch_process_logs(batch_size).unwrap_or_else(|err| {
            warn!(%err, batch_size, "batch_process_logs failed");
            BatchProcessOutcome::default()
        })
    }

    fn organizations_needing_topup(&self) -> Vec<Organization> {
        self.organizations_needing_topup().unwrap_or_else(|err| {
            warn!(%err, "organizations_needing_topup failed");
            Vec::new()
        })
    }

    fn latest_transaction(&self, organization_id: &str) -> Option<Transaction> {
        self.latest_transaction(organization_id).ok().flatten()
    }

    fn create_transaction(&self, transaction: &Transaction) {
        if let Err(err) = self.create_transaction(transaction) {
            warn!(%err, transaction_id = %transaction.id, "create_transaction failed");
        }
    }

    fn update_transaction_status(&self, id: &str, status: TransactionStatus, stripe_payment_intent_id: Option<&str>) {
        if let Err(err) = self.update_transaction_status(id, status, stripe_payment_intent_id) {
            warn!(%err, transaction_id = id, "update_transaction_status failed");
        }
    }
}

fn insert_log_with(conn: &rusqlite::Connection, log: &Log) -> Result<()> {
    conn.execute(
        "INSERT INTO logs (
            request_id, organization_id, project_id, api_key_id, used_mode, used_model, used_provider,
            requested_model, requested_provider, duration_ms, response_size, content, reasoning_content,
            finish_reason, unified_finish_reason, prompt_tokens, completion_tokens, total_tokens,
            reasoning_tokens, cached_tokens, has_error, streamed, canceled, error_details, cost,
            input_cost, output_cost, cached_input_cost, request_cost, estimated_cost, cached,
            tool_results, processed_at, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20,
            ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34
        )",
        params![
            log.request_id,
            log.organization_id,
            log.project_id,
            log.api_key_id,
            log.used_mode.map(used_mode_to_str),
            log.used_model,
            log.used_provider,
            log.requested_model,
            log.requested_provider,
            log.duration_ms,
            log.response_size,
            log.content,
            log.reasoning_content,
            log.finish_reason,
            log.unified_finish_reason.map(|r| format!("{r:?}")),
            log.prompt_tokens,
            log.completion_tokens,
            log.total_tokens,
            log.reasoning_tokens,
            log.cached_tokens,
            log.has_error,
            log.streamed,
            log.canceled,
            log.error_details.as_ref().map(serde_json::Value::to_string),
            log.cost,
            log.input_cost,
            log.output_cost,
            log.cached_input_cost,
            log.request_cost,
            log.estimated_cost,
            log.cached,
            log.tool_results.as_ref().map(serde_json::Value::to_string),
            log.processed_at.map(|t| t.to_rfc3339()),
            log.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn plan_to_str(plan: Plan) -> &'static str {
    match plan {
        Plan::Free => "free",
        Plan::Pro => "pro",
    }
}

fn plan_from_str(s: &str) -> Plan {
    if s == "pro" {
        Plan::Pro
    } else {
        Plan::Free
    }
}

fn retention_to_str(level: RetentionLevel) -> &'static str {
    match level {
        RetentionLevel::All => "all",
        RetentionLevel::None => "none",
    }
}

fn retention_from_str(s: &str) -> RetentionLevel {
    if s == "none" {
        RetentionLevel::None
    } else {
        RetentionLevel::All
    }
}

fn mode_to_str(mode: ProjectMode) -> &'static str {
    match mode {
        ProjectMode::ApiKeys => "api-keys",
        ProjectMode::Credits => "credits",
        ProjectMode::Hybrid => "hybrid",
    }
}

fn mode_from_str(s: &str) -> ProjectMode {
    match s {
        "api-keys" => ProjectMode::ApiKeys,
        "hybrid" => ProjectMode::Hybrid,
        _ => ProjectMode::Credits,
    }
}

fn key_status_to_str(status: KeyStatus) -> &'static str {
    match status {
        KeyStatus::Active => "active",
        KeyStatus::Disabled => "disabled",
    }
}

fn key_status_from_str(s: &str) -> KeyStatus {
    if s == "disabled" {
        KeyStatus::Disabled
    } else {
        KeyStatus::Active
    }
}

fn used_mode_to_str(mode: gateway_core::log::UsedMode) -> &'static str {
    match mode {
        gateway_core::log::UsedMode::ApiKeys => "api-keys",
        gateway_core::log::UsedMode::Credits => "credits",
    }
}

fn transaction_status_to_str(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Pending => "pending",
        TransactionStatus::Succeeded => "succeeded",
        TransactionStatus::Failed => "failed",
    }
}

fn transaction_status_from_str(s: &str) -> TransactionStatus {
    match s {
        "succeeded" => TransactionStatus::Succeeded,
        "failed" => TransactionStatus::Failed,
        _ => TransactionStatus::Pending,
    }
}

fn row_to_organization(row: &rusqlite::Row<'_>) -> rusqlite::Result<Organization> {
    let plan: String = row.get(1)?;
    let retention: String = row.get(7)?;
    Ok(Organization {
        id: row.get(0)?,
        plan: plan_from_str(&plan),
        credits: row.get(2)?,
        auto_top_up_enabled: row.get(3)?,
        auto_top_up_threshold: row.get(4)?,
        auto_top_up_amount: row.get(5)?,
        stripe_customer_id: row.get(6)?,
        retention_level: retention_from_str(&retention),
    })
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let mode: String = row.get(2)?;
    Ok(Project {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        mode: mode_from_str(&mode),
        caching_enabled: row.get(3)?,
        cache_duration_seconds: row.get(4)?,
    })
}

fn row_to_api_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKey> {
    let status: String = row.get(3)?;
    Ok(ApiKey {
        id: row.get(0)?,
        token: row.get(1)?,
        project_id: row.get(2)?,
        status: key_status_from_str(&status),
        usage: row.get(4)?,
        usage_limit: row.get(5)?,
    })
}

fn row_to_provider_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProviderKey> {
    let status: String = row.get(5)?;
    Ok(ProviderKey {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        provider: row.get(2)?,
        token: row.get(3)?,
        base_url: row.get(4)?,
        status: key_status_from_str(&status),
    })
}

fn row_to_custom_provider(row: &rusqlite::Row<'_>) -> rusqlite::Result<CustomProvider> {
    Ok(CustomProvider {
        organization_id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        token: row.get(3)?,
    })
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let status: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    Ok(Transaction {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        kind: TransactionKind::CreditTopup,
        credit_amount: row.get(3)?,
        amount: row.get(4)?,
        currency: row.get(5)?,
        status: transaction_status_from_str(&status),
        stripe_payment_intent_id: row.get(7)?,
        created_at: DateTime::parse_from_rfc3339(&created_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{new_in_memory, PoolConfig};

    fn store() -> Store {
        let pool = new_in_memory(&PoolConfig::default()).unwrap();
        let store = Store::new(pool);
        store.migrate().unwrap();
        store
    }

    fn org(id: &str) -> Organization {
        Organization {
            id: id.to_string(),
            plan: Plan::Free,
            credits: 100.0,
            auto_top_up_enabled: false,
            auto_top_up_threshold: 0.0,
            auto_top_up_amount: 0.0,
            stripe_customer_id: None,
            retention_level: RetentionLevel::All,
        }
    }

    #[test]
    fn roundtrips_organization() {
        let store = store();
        store.create_organization(&org("org_1")).unwrap();
        let loaded = store.organization("org_1").unwrap().unwrap();
        assert_eq!(loaded.credits, 100.0);
        assert_eq!(loaded.plan, Plan::Free);
    }

    #[test]
    fn missing_organization_is_none() {
        let store = store();
        assert!(store.organization("nope").unwrap().is_none());
    }

    #[test]
    fn roundtrips_api_key_and_finds_by_token() {
        let store = store();
        store.create_organization(&org("org_1")).unwrap();
        store
            .create_project(&Project {
                id: "proj_1".into(),
                organization_id: "org_1".into(),
                mode: ProjectMode::Credits,
                caching_enabled: true,
                cache_duration_seconds: 300,
            })
            .unwrap();
        store
            .create_api_key(&ApiKey {
                id: "key_1".into(),
                token: "sk-test".into(),
                project_id: "proj_1".into(),
                status: KeyStatus::Active,
                usage: 0.0,
                usage_limit: None,
            })
            .unwrap();

        let found = store.api_key_by_token("sk-test").unwrap().unwrap();
        assert_eq!(found.id, "key_1");
    }

    #[test]
    fn batch_process_logs_deducts_credits_and_increments_usage() {
        let store = store();
        store.create_organization(&org("org_1")).unwrap();
        store
            .create_project(&Project {
                id: "proj_1".into(),
                organization_id: "org_1".into(),
                mode: ProjectMode::Credits,
                caching_enabled: false,
                cache_duration_seconds: 300,
            })
            .unwrap();
        store
            .create_api_key(&ApiKey {
                id: "key_1".into(),
                token: "sk-test".into(),
                project_id: "proj_1".into(),
                status: KeyStatus::Active,
                usage: 0.0,
                usage_limit: None,
            })
            .unwrap();

        let log = sample_log("req_1", 0.05);
        store.insert_log(&log).unwrap();

        let outcome = store.batch_process_logs(100).unwrap();
        assert_eq!(outcome.processed, 1);

        let org = store.organization("org_1").unwrap().unwrap();
        assert!((org.credits - 99.95).abs() < 1e-9);

        let key = store.api_key_by_token("sk-test").unwrap().unwrap();
        assert!((key.usage - 0.05).abs() < 1e-9);
    }

    #[test]
    fn batch_process_logs_skips_cached_rows() {
        let store = store();
        store.create_organization(&org("org_1")).unwrap();
        store
            .create_project(&Project {
                id: "proj_1".into(),
                organization_id: "org_1".into(),
                mode: ProjectMode::Credits,
                caching_enabled: true,
                cache_duration_seconds: 300,
            })
            .unwrap();
        store
            .create_api_key(&ApiKey {
                id: "key_1".into(),
                token: "sk-test".into(),
                project_id: "proj_1".into(),
                status: KeyStatus::Active,
                usage: 0.0,
                usage_limit: None,
            })
            .unwrap();

        let mut log = sample_log("req_cached", 0.05);
        log.cached = true;
        store.insert_log(&log).unwrap();

        store.batch_process_logs(100).unwrap();
        let org = store.organization("org_1").unwrap().unwrap();
        assert_eq!(org.credits, 100.0);
    }

    #[test]
    fn batch_process_marks_processed_at_exactly_once() {
        let store = store();
        store.create_organization(&org("org_1")).unwrap();
        store
            .create_project(&Project {
                id: "proj_1".into(),
                organization_id: "org_1".into(),
                mode: ProjectMode::Credits,
                caching_enabled: false,
                cache_duration_seconds: 300,
            })
            .unwrap();
        store
            .create_api_key(&ApiKey {
                id: "key_1".into(),
                token: "sk-test".into(),
                project_id: "proj_1".into(),
                status: KeyStatus::Active,
                usage: 0.0,
                usage_limit: None,
            })
            .unwrap();
        store.insert_log(&sample_log("req_1", 0.01)).unwrap();

        store.batch_process_logs(100).unwrap();
        let second = store.batch_process_logs(100).unwrap();
        assert_eq!(second.processed, 0);
    }

    fn sample_log(request_id: &str, cost: f64) -> Log {
        Log {
            request_id: request_id.to_string(),
            organization_id: "org_1".to_string(),
            project_id: "proj_1".to_string(),
            api_key_id: "key_1".to_string(),
            used_mode: Some(gateway_core::log::UsedMode::Credits),
            used_model: Some("openai/gpt-5-nano".to_string()),
            used_provider: Some("openai".to_string()),
            requested_model: "gpt-5-nano".to_string(),
            requested_provider: None,
            duration_ms: 120,
            response_size: 256,
            content: Some("OK".to_string()),
            reasoning_content: None,
            finish_reason: Some("stop".to_string()),
            unified_finish_reason: Some(gateway_core::log::UnifiedFinishReason::Stop),
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
            reasoning_tokens: 0,
            cached_tokens: 0,
            has_error: false,
            streamed: false,
            canceled: false,
            error_details: None,
            cost,
            input_cost: cost / 2.0,
            output_cost: cost / 2.0,
            cached_input_cost: 0.0,
            request_cost: 0.0,
            estimated_cost: false,
            cached: false,
            tool_results: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }
}
