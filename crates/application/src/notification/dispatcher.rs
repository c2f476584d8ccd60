use std::sync::Arc;

use async_trait::async_trait;
use domain::{ApplicationEvent, JobId, NotificationPayload};
use serde_json::Value;
use thiserror::Error;

use super::directory::RecipientDirectory;
use super::transport::{TEMPLATE_APPLICATION_RECEIVED, TEMPLATE_STATUS_CHANGED};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("delivery queue is shut down")]
    Closed,
}

/// 投递任务的入队契约
///
/// 进程内队列和外部持久化消息中间件都实现这个 trait。
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, payload: NotificationPayload) -> Result<JobId, QueueError>;
}

/// 把已提交的领域事件翻译为投递任务
///
/// 只能在业务事务提交之后调用；不会直接发送邮件，也不会把错误传回业务流程。
pub struct NotificationDispatcher {
    queue: Arc<dyn NotificationQueue>,
    directory: Arc<dyn RecipientDirectory>,
}

impl NotificationDispatcher {
    pub fn new(queue: Arc<dyn NotificationQueue>, directory: Arc<dyn RecipientDirectory>) -> Self {
        Self { queue, directory }
    }

    /// 纯转换：事件 -> 投递内容；收件人无法解析时返回 `None`
    pub fn payload_for(&self, event: &ApplicationEvent) -> Option<NotificationPayload> {
        match event {
            ApplicationEvent::Submitted {
                application_id,
                project_id,
                project_title,
                owner_id,
                student_id,
                submitted_at,
            } => {
                let recipient = self.directory.address_of(*owner_id)?;
                Some(
                    NotificationPayload::new(recipient, TEMPLATE_APPLICATION_RECEIVED)
                        .with_data("application_id", application_id.to_string())
                        .with_data("project_id", project_id.to_string())
                        .with_data("project_title", project_title.clone())
                        .with_data("student_id", student_id.to_string())
                        .with_data("submitted_at", submitted_at.to_rfc3339()),
                )
            }
            ApplicationEvent::StatusChanged {
                application_id,
                project_id,
                project_title,
                student_id,
                previous_status,
                new_status,
                rejection_reason,
                reviewed_at,
                ..
            } => {
                let recipient = self.directory.address_of(*student_id)?;
                let reason = rejection_reason
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null);
                Some(
                    NotificationPayload::new(recipient, TEMPLATE_STATUS_CHANGED)
                        .with_data("application_id", application_id.to_string())
                        .with_data("project_id", project_id.to_string())
                        .with_data("project_title", project_title.clone())
                        .with_data("previous_status", previous_status.as_str())
                        .with_data("new_status", new_status.as_str())
                        .with_data("rejection_reason", reason)
                        .with_data("reviewed_at", reviewed_at.to_rfc3339()),
                )
            }
        }
    }

    /// 入队一次，失败只记录日志
    pub async fn notify(&self, event: ApplicationEvent) -> Option<JobId> {
        let Some(payload) = self.payload_for(&event) else {
            tracing::warn!(
                event = event.kind(),
                application_id = %event.application_id(),
                "recipient could not be resolved, notification skipped"
            );
            return None;
        };

        match self.queue.enqueue(payload).await {
            Ok(job_id) => {
                tracing::debug!(
                    event = event.kind(),
                    application_id = %event.application_id(),
                    %job_id,
                    "notification enqueued"
                );
                Some(job_id)
            }
            Err(err) => {
                tracing::error!(
                    event = event.kind(),
                    application_id = %event.application_id(),
                    error = %err,
                    "failed to enqueue notification"
                );
                None
            }
        }
    }
}
