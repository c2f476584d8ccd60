//! 领域实体模块

pub mod application;
pub mod delivery_job;
pub mod project;

pub use application::{Application, ApplicationStatus};
pub use delivery_job::{DeliveryJob, JobState, NotificationPayload};
pub use project::{Project, ProjectStatus};
