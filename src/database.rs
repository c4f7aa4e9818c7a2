use sqlx::{postgres::PgPoolOptions, PgPool};
use std::future::Future;
use std::time::Duration;

use crate::config::Settings;

/// PostgreSQL (+ PostGIS) connection pool. Schema and migrations are
/// managed externally; the pool only consumes the tables.
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(settings: &Settings) -> Result<Self, sqlx::Error> {
        let statement_timeout_ms = settings.db_command_timeout_secs * 1000;

        let pool = PgPoolOptions::new()
            .max_connections(settings.db_pool_size + settings.db_max_overflow)
            .min_connections(settings.db_pool_size.min(5))
            .acquire_timeout(Duration::from_secs(settings.db_pool_timeout_secs))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(settings.db_pool_recycle_secs))
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    // Backend-side query timeout; the driver enforces the
                    // same bound through the statement timeout below.
                    sqlx::query(&format!("SET statement_timeout = {statement_timeout_ms}"))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&settings.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Whether an error is worth retrying: connection-level failures only.
/// Integrity violations and statement timeouts are never retried.
fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => {
            // Class 08: connection exception; 57P01: admin shutdown.
            db.code()
                .map(|code| code.starts_with("08") || code == "57P01")
                .unwrap_or(false)
        }
        _ => false,
    }
}

/// Retries a database operation up to 3 times with exponential backoff
/// (0.1 s, 0.2 s, 0.4 s, capped at 1 s) on transient connection errors.
pub async fn with_db_retry<T, Fut, F>(mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    const MAX_ATTEMPTS: u32 = 3;
    let mut delay = Duration::from_millis(100);

    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_ATTEMPTS && is_transient(&e) => {
                log::warn!("transient db error (attempt {attempt}/{MAX_ATTEMPTS}): {e}");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(1));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn io_errors_are_transient_but_not_others() {
        let io = sqlx::Error::Io(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "x"));
        assert!(is_transient(&io));
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn retry_gives_up_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), sqlx::Error> = with_db_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::PoolTimedOut) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_immediately_on_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), sqlx::Error> = with_db_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_db_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
