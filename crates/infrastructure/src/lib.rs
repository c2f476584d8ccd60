//! 基础设施层实现。
//!
//! 提供 PostgreSQL 申请存储、邮件发送通道等适配器，实现应用层定义的接口。

pub mod builder;
pub mod db;
pub mod mail;

pub use builder::{Infrastructure, InfrastructureError};
pub use db::{create_pg_pool, PgIntakeStore, PgTransactionSettings, MIGRATOR};
pub use mail::{HttpMailTransport, LogMailTransport, MailSetupError};
