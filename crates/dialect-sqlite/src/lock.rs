use std::thread;
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use sqlbridge_core::{QueryRunner, Result, Value};
use tracing::debug;

/// Seconds after which an unreleased lock is considered abandoned.
const LOCK_TTL_SECONDS: i64 = 3600;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const CREATE_LOCK_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS \"__sqlbridge_lock\" \
     (\"name\" TEXT PRIMARY KEY, \"expires_at\" INTEGER NOT NULL)";
const PURGE_EXPIRED_SQL: &str = "DELETE FROM \"__sqlbridge_lock\" \
     WHERE \"expires_at\" < CAST(strftime('%s', 'now') AS INTEGER)";
const ACQUIRE_SQL: &str = "INSERT OR IGNORE INTO \"__sqlbridge_lock\" (\"name\", \"expires_at\") \
     VALUES (?, CAST(strftime('%s', 'now') AS INTEGER) + ?)";
const RELEASE_SQL: &str = "DELETE FROM \"__sqlbridge_lock\" WHERE \"name\" = ?";
const IS_LOCKED_SQL: &str = "SELECT 1 FROM \"__sqlbridge_lock\" \
     WHERE \"name\" = ? AND \"expires_at\" >= CAST(strftime('%s', 'now') AS INTEGER)";

fn lock_key(name: &str) -> String {
    hex::encode(Md5::digest(name.as_bytes()))
}

/// Claims the row for `name`, polling until `timeout` runs out. Expired rows
/// are purged on every attempt. Locks are not reentrant.
pub(crate) fn get_lock(
    runner: &mut dyn QueryRunner,
    name: &str,
    timeout: Duration,
) -> Result<bool> {
    runner.fetch(CREATE_LOCK_TABLE_SQL, &[])?;
    let key = lock_key(name);
    let params = [Value::from(key), Value::Int(LOCK_TTL_SECONDS)];
    let deadline = Instant::now() + timeout;
    loop {
        runner.fetch(PURGE_EXPIRED_SQL, &[])?;
        if runner.fetch(ACQUIRE_SQL, &params)?.affected_rows == 1 {
            debug!(lock = name, "lock acquired");
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
    runner.fetch(CREATE_LOCK_TABLE_SQL, &[])?;
    let released = runner.fetch(RELEASE_SQL, &[Value::from(lock_key(name))])?;
    Ok(released.affected_rows > 0)
}

pub(crate) fn is_locked(runner: &mut dyn QueryRunner, name: &str) -> Result<bool> {
    runner.fetch(CREATE_LOCK_TABLE_SQL, &[])?;
    let result = runner.fetch(IS_LOCKED_SQL, &[Value::from(lock_key(name))])?;
    Ok(!result.rows.is_empty())
}
