use std::thread;
use std::time::{Duration, Instant};

use sqlbridge_core::{QueryRunner, Result, Value};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const TRY_LOCK_SQL: &str = "SELECT pg_try_advisory_lock(?) AS acquired";
const UNLOCK_SQL: &str = "SELECT pg_advisory_unlock(?) AS released";
const IS_LOCKED_SQL: &str = "SELECT 1 FROM pg_locks WHERE locktype = 'advisory' AND granted \
     AND classid::bigint = 0 AND objid::bigint = ? AND objsubid = 1";

/// Advisory locks take a 64-bit key. The checksum fits in the low word, so
/// the lock shows up in `pg_locks` with a zero `classid`.
fn lock_key(name: &str) -> i64 {
    i64::from(crc32fast::hash(name.as_bytes()))
}

fn flag(runner: &mut dyn QueryRunner, sql: &str, key: i64) -> Result<bool> {
    let rows = runner.fetch_rows(sql, &[Value::Int(key)])?;
    Ok(rows
        .first()
        .and_then(|row| row.value_at(0))
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// Session-level lock; reentrant for the holding session.
pub(crate) fn get_lock(
    runner: &mut dyn QueryRunner,
    name: &str,
    timeout: Duration,
) -> Result<bool> {
    let key = lock_key(name);
    let deadline = Instant::now() + timeout;
    loop {
        if flag(runner, TRY_LOCK_SQL, key)? {
            debug!(lock = name, key, "lock acquired");
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            debug!(lock = name, timeout_ms = timeout.as_millis() as u64, "lock wait timed out");
            return Ok(false);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

pub(crate) fn release_lock(runner: &mut dyn QueryRunner, name: &str) -> Result<bool> {
    flag(runner, UNLOCK_SQL, lock_key(name))
}

pub(crate) fn is_locked(runner: &mut dyn QueryRunner, name: &str) -> Result<bool> {
    let rows = runner.fetch_rows(IS_LOCKED_SQL, &[Value::Int(lock_key(name))])?;
    Ok(!rows.is_empty())
}

#[cfg(test)]
mod tests {
    use super::lock_key;

    #[test]
    fn lock_keys_are_stable_and_non_negative() {
        let key = lock_key("cron:index");
        assert!(key >= 0);
        assert_eq!(key, lock_key("cron:index"));
        assert_ne!(key, lock_key("cron:reindex"));
    }
}
