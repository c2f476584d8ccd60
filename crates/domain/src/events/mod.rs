//! 领域事件模块

pub mod application_event;

pub use application_event::ApplicationEvent;
