//! 领域模型错误定义
//!
//! 定义了业务规则违反与存储适配器失败两类错误，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 项目未发布，不接受申请
    #[error("项目未发布: 当前状态 {status}")]
    ProjectNotPublished { status: String },

    /// 项目名额已满
    #[error("项目名额已满 (capacity reached): {current}/{max}")]
    CapacityReached { current: u32, max: u32 },

    /// 非法的申请状态迁移
    #[error("非法的状态迁移: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// 拒绝申请必须给出原因
    #[error("拒绝申请必须提供原因")]
    RejectionReasonRequired,

    /// 非法的投递任务状态迁移
    #[error("非法的投递任务状态迁移: {from} -> {to}")]
    InvalidJobTransition { from: &'static str, to: &'static str },

    /// 参数验证错误
    #[error("验证失败: {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl DomainError {
    /// 创建参数验证错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储适配器错误
///
/// 事务性存储需要把底层的并发失败区分开：序列化冲突属于“输掉竞争”，
/// 锁等待超时属于可重试的瞬时错误。
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("constraint violated: {constraint}")]
    Conflict { constraint: String },

    #[error("could not serialize access due to concurrent update")]
    SerializationFailure,

    #[error("lock wait or statement timeout exceeded")]
    LockTimeout,

    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RepositoryError {
    pub fn conflict(constraint: impl Into<String>) -> Self {
        Self::Conflict {
            constraint: constraint.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
