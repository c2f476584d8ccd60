//! 通知投递
//!
//! 业务事务提交后，`NotificationDispatcher` 把领域事件翻译成投递任务交给
//! `NotificationQueue`；`DeliveryQueue` 是它的进程内实现，负责重试与退避。

mod directory;
mod dispatcher;
mod queue;
mod retry;
mod transport;

pub use directory::{DomainRecipientDirectory, RecipientDirectory};
pub use dispatcher::{NotificationDispatcher, NotificationQueue, QueueError};
pub use queue::{DeliveryOutcome, DeliveryQueue, DeliveryQueueConfig, QueueStats, ShutdownReport};
pub use retry::RetryPolicy;
pub use transport::{
    MailTransport, MessageRenderer, PlainTextRenderer, RenderedMessage, TransportError,
    TEMPLATE_APPLICATION_RECEIVED, TEMPLATE_STATUS_CHANGED,
};

#[cfg(any(test, feature = "testing"))]
pub use dispatcher::MockNotificationQueue;
#[cfg(any(test, feature = "testing"))]
pub use transport::MockMailTransport;
