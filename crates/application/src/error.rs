use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 应用层错误
///
/// 除 `Infrastructure` 外，每个变体都对应一种调用方可区分的结果；
/// 返回任何错误时事务都已完整回滚。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// 锁等待或事务时长超限，调用方可以重试
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        ApplicationError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApplicationError::Transient(_))
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidJobTransition { .. } => {
                ApplicationError::Infrastructure(value.to_string())
            }
            other => ApplicationError::Validation(other.to_string()),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => ApplicationError::not_found("record", "unknown"),
            RepositoryError::Conflict { constraint } => {
                ApplicationError::Conflict(format!("constraint {constraint} violated"))
            }
            RepositoryError::SerializationFailure => ApplicationError::Conflict(
                "a concurrent request modified the same records; the transaction was rolled back"
                    .to_string(),
            ),
            RepositoryError::LockTimeout => {
                ApplicationError::Transient("lock wait timeout exceeded".to_string())
            }
            RepositoryError::Storage { message, .. } => ApplicationError::Infrastructure(message),
        }
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
