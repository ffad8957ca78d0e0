use std::future::Future;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Connection setup for the database behind every repository call.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(8),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Establishes a connection pool with bounded timeouts.
pub async fn establish_connection(config: &DbConfig) -> Result<DatabaseConnection, ServiceError> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    info!("Database connection established");
    Ok(db)
}

pub async fn establish_connection_from_app_config(
    cfg: &AppConfig,
) -> Result<DatabaseConnection, ServiceError> {
    let db_config = DbConfig {
        url: cfg.database_url.clone(),
        ..Default::default()
    };
    establish_connection(&db_config).await
}

const READ_RETRY_ATTEMPTS: u32 = 3;
const READ_RETRY_BASE_DELAY_MS: u64 = 50;

/// Retries an idempotent read with exponential backoff.
///
/// Only reads go through here; writes are never blindly retried. The
/// idempotent-transition rule in the order service is what makes a re-sent
/// status update safe.
pub async fn retry_read<T, F, Fut>(operation_name: &str, mut f: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transport() && attempt + 1 < READ_RETRY_ATTEMPTS => {
                let delay = Duration::from_millis(READ_RETRY_BASE_DELAY_MS << attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %err,
                    "read failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(operation = operation_name, error = %err, "read failed");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_read_retries_transport_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ServiceError> = retry_read("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ServiceError::Timeout("simulated".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_read_does_not_retry_not_found() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ServiceError> = retry_read("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(ServiceError::NotFound("missing".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
