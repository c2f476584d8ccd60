use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use domain::UserId;
use uuid::Uuid;

use crate::error::ApiError;

/// 上游网关写入的已认证用户 ID
pub const ACTOR_HEADER: &str = "x-actor-id";

/// 当前请求的操作者
///
/// 认证由上游完成，这里只解析 `X-Actor-Id` 头。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing X-Actor-Id header"))?;

        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| ApiError::unauthorized("X-Actor-Id must be a UUID"))?;

        Ok(Actor(UserId::from(id)))
    }
}
