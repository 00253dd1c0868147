//! The `withLock` mutual-exclusion primitive the usage worker uses to
//! keep `batchProcessLogs` and `processAutoTopUp` from overlapping across
//! replicas (§4.5, §9 design notes).
//!
//! A lock is just a row in `locks` keyed by name. Acquiring inserts it (or
//! reclaims it if the existing row is older than [`Lock::EXPIRY_SECS`]);
//! releasing deletes it. There is no separate lease renewal — a sweep
//! either finishes within the expiry window or the row is reclaimed by
//! the next worker tick.

use chrono::Utc;
use rusqlite::params;

use gateway_core::log::Lock;

use crate::error::Result;
use crate::pool::ConnectionPool;

/// Try to acquire `key`. Returns `true` if the lock was taken (either the
/// row didn't exist, or it existed but was expired).
pub fn try_acquire(pool: &ConnectionPool, key: &str) -> Result<bool> {
    let conn = pool.get()?;
    let now = Utc::now();

    let existing: Option<String> = conn
        .query_row("SELECT updated_at FROM locks WHERE key = ?1", [key], |row| row.get(0))
        .ok();

    match existing {
        None => {
            conn.execute(
                "INSERT INTO locks (key, updated_at) VALUES (?1, ?2)",
                params![key, now.to_rfc3339()],
            )?;
            Ok(true)
        }
        Some(updated_at) => {
            let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or(now);
            let lock = Lock { key: key.to_string(), updated_at };
            if lock.is_expired(now) {
                conn.execute(
                    "UPDATE locks SET updated_at = ?1 WHERE key = ?2",
                    params![now.to_rfc3339(), key],
                )?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }
}

/// Release `key`, making it immediately acquirable again.
pub fn release(pool: &ConnectionPool, key: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM locks WHERE key = ?1", [key])?;
    Ok(())
}

/// Run `f` while holding `key`, releasing it (even on error/panic-unwind)
/// once `f` returns. Returns `Ok(None)` without running `f` if the lock
/// is already held.
pub fn with_lock<T>(pool: &ConnectionPool, key: &str, f: impl FnOnce() -> Result<T>) -> Result<Option<T>> {
    if !try_acquire(pool, key)? {
        return Ok(None);
    }
    let result = f();
    release(pool, key)?;
    result.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{new_in_memory, PoolConfig};

    fn pool() -> ConnectionPool {
        let pool = new_in_memory(&PoolConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        crate::migrations::run_migrations(&conn).unwrap();
        pool
    }

    #[test]
    fn acquires_a_free_lock() {
        let pool = pool();
        assert!(try_acquire(&pool, Lock::CREDIT_PROCESSING).unwrap());
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let pool = pool();
        assert!(try_acquire(&pool, Lock::CREDIT_PROCESSING).unwrap());
        assert!(!try_acquire(&pool, Lock::CREDIT_PROCESSING).unwrap());
    }

    #[test]
    fn release_allows_reacquiring() {
        let pool = pool();
        assert!(try_acquire(&pool, Lock::CREDIT_PROCESSING).unwrap());
        release(&pool, Lock::CREDIT_PROCESSING).unwrap();
        assert!(try_acquire(&pool, Lock::CREDIT_PROCESSING).unwrap());
    }

    #[test]
    fn expired_lock_is_reclaimed() {
        let pool = pool();
        let conn = pool.get().unwrap();
        let stale = Utc::now() - chrono::Duration::seconds(Lock::EXPIRY_SECS + 1);
        conn.execute(
            "INSERT INTO locks (key, updated_at) VALUES (?1, ?2)",
            params![Lock::CREDIT_PROCESSING, stale.to_rfc3339()],
        )
        .unwrap();
        drop(conn);
        assert!(try_acquire(&pool, Lock::CREDIT_PROCESSING).unwrap());
    }

    #[test]
    fn with_lock_runs_body_and_releases() {
        let pool = pool();
        let ran = with_lock(&pool, Lock::AUTO_TOPUP_CHECK, || Ok(42)).unwrap();
        assert_eq!(ran, Some(42));
        assert!(try_acquire(&pool, Lock::AUTO_TOPUP_CHECK).unwrap());
    }

    #[test]
    fn with_lock_skips_body_when_held() {
        let pool = pool();
        assert!(try_acquire(&pool, Lock::AUTO_TOPUP_CHECK).unwrap());
        let ran = with_lock(&pool, Lock::AUTO_TOPUP_CHECK, || Ok(42)).unwrap();
        assert_eq!(ran, None);
    }
}
