//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP 请求委托给应用层的申请受理服务。

mod actor;
mod dto;
mod error;
mod routes;
mod state;

pub use actor::{Actor, ACTOR_HEADER};
pub use dto::{ApplicationDto, ProjectDto};
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
