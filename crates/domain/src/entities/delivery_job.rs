//! 通知投递任务
//!
//! 每个任务是一个小型状态机：
//! `Pending -> Deferred -> ... -> Delivered | PermanentlyFailed`。
//! 终态任务不能再回到 `Deferred`，尝试次数只在状态迁移时递增。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{JobId, Timestamp};

/// 投递内容：收件人、模板键和模板数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub recipient: String,
    pub template_key: String,
    pub template_data: Map<String, Value>,
}

impl NotificationPayload {
    pub fn new(recipient: impl Into<String>, template_key: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            template_key: template_key.into(),
            template_data: Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.template_data.insert(key.into(), value.into());
        self
    }
}

/// 任务状态
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    /// 尚未尝试
    Pending,
    /// 投递失败，等待 `next_retry_at` 之后重试
    Deferred {
        next_retry_at: Instant,
        last_error: String,
    },
    Delivered {
        delivered_at: Timestamp,
    },
    PermanentlyFailed {
        failed_at: Timestamp,
        last_error: String,
    },
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Deferred { .. } => "deferred",
            JobState::Delivered { .. } => "delivered",
            JobState::PermanentlyFailed { .. } => "permanently_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Delivered { .. } | JobState::PermanentlyFailed { .. }
        )
    }
}

/// 投递任务
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    id: JobId,
    payload: NotificationPayload,
    attempts: u32,
    max_attempts: u32,
    created_at: Timestamp,
    state: JobState,
}

impl DeliveryJob {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(payload: NotificationPayload, max_attempts: u32, created_at: Timestamp) -> Self {
        Self {
            id: JobId::generate(),
            payload,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            created_at,
            state: JobState::Pending,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn payload(&self) -> &NotificationPayload {
        &self.payload
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn next_retry_at(&self) -> Option<Instant> {
        match &self.state {
            JobState::Deferred { next_retry_at, .. } => Some(*next_retry_at),
            _ => None,
        }
    }

    /// 是否可以立即尝试投递
    pub fn is_ready(&self, now: Instant) -> bool {
        match &self.state {
            JobState::Pending => true,
            JobState::Deferred { next_retry_at, .. } => *next_retry_at <= now,
            JobState::Delivered { .. } | JobState::PermanentlyFailed { .. } => false,
        }
    }

    fn ensure_attemptable(&self, to: &'static str) -> DomainResult<()> {
        if self.state.is_terminal() {
            return Err(DomainError::InvalidJobTransition {
                from: self.state.name(),
                to,
            });
        }
        Ok(())
    }

    /// 记录一次成功投递
    pub fn record_success(&mut self, delivered_at: Timestamp) -> DomainResult<()> {
        self.ensure_attemptable("delivered")?;
        self.attempts += 1;
        self.state = JobState::Delivered { delivered_at };
        Ok(())
    }

    /// 记录一次失败投递
    ///
    /// `delay_for_attempt` 接收本次尝试的序号（从 1 开始），返回下次重试前的等待时间。
    /// 尝试次数达到上限时进入 `PermanentlyFailed`。
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        now: Instant,
        failed_at: Timestamp,
        delay_for_attempt: impl FnOnce(u32) -> Duration,
    ) -> DomainResult<&JobState> {
        self.ensure_attemptable("deferred")?;
        self.attempts += 1;
        let last_error = error.into();

        self.state = if self.attempts >= self.max_attempts {
            JobState::PermanentlyFailed {
                failed_at,
                last_error,
            }
        } else {
            JobState::Deferred {
                next_retry_at: now + delay_for_attempt(self.attempts),
                last_error,
            }
        };

        Ok(&self.state)
    }
}
