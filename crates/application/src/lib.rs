//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：申请受理的事务边界、
//! 通知分发与进程内投递队列，以及存储和邮件发送的抽象。

pub mod clock;
pub mod error;
pub mod memory;
pub mod notification;
pub mod repository;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use error::{ApplicationError, ApplicationResult};
pub use memory::MemoryIntakeStore;
pub use notification::{
    DeliveryOutcome, DeliveryQueue, DeliveryQueueConfig, DomainRecipientDirectory,
    MailTransport, MessageRenderer, NotificationDispatcher, NotificationQueue, PlainTextRenderer,
    QueueError, QueueStats, RecipientDirectory, RenderedMessage, RetryPolicy, ShutdownReport,
    TransportError,
};
pub use repository::{IntakeStore, IntakeTransaction};
pub use services::{
    ApplicationIntakeDependencies, ApplicationIntakeService, CreateProjectRequest,
    IntakeSettings, SubmitApplicationRequest, UpdateStatusRequest,
};
