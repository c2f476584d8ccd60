//! 项目申请实体定义

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ApplicationId, ProjectId, Timestamp, UserId};

/// 申请状态
///
/// PENDING -> UNDER_REVIEW -> {ACCEPTED, REJECTED}，或 PENDING 直接进入终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "PENDING",
            ApplicationStatus::UnderReview => "UNDER_REVIEW",
            ApplicationStatus::Accepted => "ACCEPTED",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Accepted | ApplicationStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Pending, UnderReview)
                | (Pending, Accepted)
                | (Pending, Rejected)
                | (UnderReview, Accepted)
                | (UnderReview, Rejected)
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ApplicationStatus::Pending),
            "UNDER_REVIEW" => Ok(ApplicationStatus::UnderReview),
            "ACCEPTED" => Ok(ApplicationStatus::Accepted),
            "REJECTED" => Ok(ApplicationStatus::Rejected),
            other => Err(DomainError::invalid_argument(
                "application_status",
                format!("unknown status {other}"),
            )),
        }
    }
}

/// 申请实体，每个 (project_id, student_id) 组合最多一条，永不删除
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub project_id: ProjectId,
    pub student_id: UserId,
    pub cover_letter: String,
    pub resume_url: Option<String>,
    pub status: ApplicationStatus,
    /// 仅在 REJECTED 状态下存在
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Application {
    /// 创建待审核的新申请
    pub fn pending(
        project_id: ProjectId,
        student_id: UserId,
        cover_letter: impl Into<String>,
        resume_url: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: ApplicationId::generate(),
            project_id,
            student_id,
            cover_letter: cover_letter.into(),
            resume_url,
            status: ApplicationStatus::Pending,
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 审核申请，返回审核前的状态
    ///
    /// 调用方负责确认 `reviewer` 是项目发布者。
    pub fn review(
        &mut self,
        reviewer: UserId,
        next: ApplicationStatus,
        reason: Option<String>,
        now: Timestamp,
    ) -> DomainResult<ApplicationStatus> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        if next == ApplicationStatus::Rejected && reason.is_none() {
            return Err(DomainError::RejectionReasonRequired);
        }

        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        let previous = self.status;
        self.status = next;
        self.rejection_reason = if next == ApplicationStatus::Rejected {
            reason
        } else {
            None
        };
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self.updated_at = now;

        Ok(previous)
    }
}
