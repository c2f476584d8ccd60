//! 连接池、迁移与 sqlx 错误映射

mod intake_store;

pub use intake_store::{PgIntakeStore, PgTransactionSettings};

use std::time::Duration;

use domain::RepositoryError;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}

/// 把 PostgreSQL 的并发失败区分出来，其余归为存储错误
pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            // serialization_failure / deadlock_detected
            Some("40001") | Some("40P01") => return RepositoryError::SerializationFailure,
            // lock_not_available / query_canceled（statement_timeout）
            Some("55P03") | Some("57014") => return RepositoryError::LockTimeout,
            // unique_violation / check_violation
            Some("23505") | Some("23514") => {
                return RepositoryError::conflict(db_err.constraint().unwrap_or("unknown"));
            }
            _ => {}
        }
    }

    if matches!(err, sqlx::Error::PoolTimedOut) {
        return RepositoryError::LockTimeout;
    }

    RepositoryError::storage_with_source(err.to_string(), err)
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}
