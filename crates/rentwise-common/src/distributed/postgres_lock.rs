use super::LockKey;
use sqlx::{pool::PoolConnection, PgConnection, PgPool, Postgres};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Lock timeout after {0} seconds")]
    Timeout(u64),
}

/// Acquire a transaction-scoped advisory lock, waiting until it is free.
///
/// `conn` must be the connection of an open transaction. The lock is released by
/// PostgreSQL when that transaction commits or rolls back; there is no guard.
pub async fn lock_for_transaction(conn: &mut PgConnection, key: LockKey) -> Result<(), LockError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(key.value())
        .execute(conn)
        .await?;

    debug!("Acquired transaction advisory lock {}", key);
    Ok(())
}

/// A guard that holds a session-level advisory lock.
///
/// Call [`AdvisoryLockGuard::release`] when done. If the guard is dropped instead,
/// its connection is detached from the pool and closed, which makes PostgreSQL
/// release the lock with the session.
pub struct AdvisoryLockGuard {
    conn: Option<PoolConnection<Postgres>>,
    key: LockKey,
}

impl AdvisoryLockGuard {
    pub async fn release(mut self) -> Result<(), LockError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let released: bool = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(self.key.value())
            .fetch_one(&mut *conn)
            .await?;

        if released {
            info!("Released advisory lock {}", self.key);
        } else {
            warn!("Advisory lock {} was not held at release", self.key);
        }
        Ok(())
    }
}

impl Drop for AdvisoryLockGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!(
                "Advisory lock guard {} dropped without release, closing session",
                self.key
            );
            drop(conn.detach());
        }
    }
}

/// Session-level advisory locks for work that spans several transactions,
/// such as running migrations.
#[derive(Clone)]
pub struct AdvisoryLock {
    pool: PgPool,
}

impl AdvisoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Acquire the lock, waiting at most `timeout_secs` seconds.
    pub async fn acquire_with_timeout(
        &self,
        key: LockKey,
        timeout_secs: u64,
    ) -> Result<AdvisoryLockGuard, LockError> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, false)")
            .bind(format!("{}s", timeout_secs))
            .execute(&mut *conn)
            .await?;

        let outcome = sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(key.value())
            .execute(&mut *conn)
            .await;

        sqlx::query("SELECT set_config('lock_timeout', '0', false)")
            .execute(&mut *conn)
            .await?;

        match outcome {
            Ok(_) => {
                info!("Acquired advisory lock {} after waiting", key);
                Ok(AdvisoryLockGuard {
                    conn: Some(conn),
                    key,
                })
            }
            // 55P03: lock_not_available
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("55P03") => {
                Err(LockError::Timeout(timeout_secs))
            }
            Err(e) => Err(e.into()),
        }
    }
}
