use std::sync::Arc;

use application::{IntakeStore, MailTransport, MemoryIntakeStore};
use config::{AppConfig, MailTransportKind, StorageBackend};
use thiserror::Error;

use crate::{
    db::{create_pg_pool, PgIntakeStore, PgTransactionSettings, MIGRATOR},
    mail::{HttpMailTransport, LogMailTransport, MailSetupError},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("mail transport error: {0}")]
    Mail(#[from] MailSetupError),
}

/// 按配置装配好的适配器
#[derive(Clone)]
pub struct Infrastructure {
    pub store: Arc<dyn IntakeStore>,
    pub transport: Arc<dyn MailTransport>,
}

impl Infrastructure {
    /// 连接存储（PostgreSQL 时顺带执行迁移）并创建邮件通道
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let store: Arc<dyn IntakeStore> = match config.database.backend {
            StorageBackend::Postgres => {
                let pool = create_pg_pool(
                    &config.database.url,
                    config.database.max_connections,
                    config.intake.lock_wait_timeout(),
                )
                .await?;
                MIGRATOR.run(&pool).await?;
                tracing::info!(
                    max_connections = config.database.max_connections,
                    "postgres intake store ready"
                );
                Arc::new(PgIntakeStore::new(
                    pool,
                    PgTransactionSettings::from(&config.intake),
                ))
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory intake store, data is lost on restart");
                Arc::new(MemoryIntakeStore::new(config.intake.lock_wait_timeout()))
            }
        };

        let transport: Arc<dyn MailTransport> = match config.mail.transport {
            MailTransportKind::Http => Arc::new(HttpMailTransport::from_config(&config.mail)?),
            MailTransportKind::Log => Arc::new(LogMailTransport),
        };

        Ok(Self { store, transport })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_needs_no_database() {
        let mut config = AppConfig::default();
        config.database.backend = StorageBackend::Memory;

        let infrastructure = Infrastructure::connect(&config).await.unwrap();
        assert!(infrastructure
            .store
            .find_project(domain::ProjectId::generate())
            .await
            .unwrap()
            .is_none());
    }
}
