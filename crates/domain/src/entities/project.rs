//! 项目实体定义
//!
//! 项目由导师或企业发布，`current_applicants` 是申请名额计数器，
//! 只能在申请受理事务内部递增。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ProjectId, Timestamp, UserId};

/// 项目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Draft,
    Published,
    Closed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "DRAFT",
            ProjectStatus::Published => "PUBLISHED",
            ProjectStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(ProjectStatus::Draft),
            "PUBLISHED" => Ok(ProjectStatus::Published),
            "CLOSED" => Ok(ProjectStatus::Closed),
            other => Err(DomainError::invalid_argument(
                "project_status",
                format!("unknown status {other}"),
            )),
        }
    }
}

/// 项目实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// 发布者，只有发布者可以审核申请
    pub owner_id: UserId,
    pub title: String,
    pub status: ProjectStatus,
    /// 名额上限，`None` 表示不限
    pub max_applicants: Option<u32>,
    /// 已提交申请数量
    pub current_applicants: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    /// 创建新项目
    pub fn new(
        owner_id: UserId,
        title: impl Into<String>,
        status: ProjectStatus,
        max_applicants: Option<u32>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::invalid_argument("title", "must not be empty"));
        }
        if max_applicants == Some(0) {
            return Err(DomainError::invalid_argument(
                "max_applicants",
                "must be at least 1 when set",
            ));
        }

        Ok(Self {
            id: ProjectId::generate(),
            owner_id,
            title: title.trim().to_string(),
            status,
            max_applicants,
            current_applicants: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    /// 剩余名额；不限名额时返回 `None`
    pub fn remaining_capacity(&self) -> Option<u32> {
        self.max_applicants
            .map(|max| max.saturating_sub(self.current_applicants))
    }

    /// 检查项目当前是否可以接受新申请
    pub fn ensure_accepting_applications(&self) -> DomainResult<()> {
        if self.status != ProjectStatus::Published {
            return Err(DomainError::ProjectNotPublished {
                status: self.status.to_string(),
            });
        }

        self.ensure_capacity_available()
    }

    fn ensure_capacity_available(&self) -> DomainResult<()> {
        match self.max_applicants {
            Some(max) if self.current_applicants >= max => Err(DomainError::CapacityReached {
                current: self.current_applicants,
                max,
            }),
            _ => Ok(()),
        }
    }

    /// 占用一个名额
    ///
    /// 只守护名额计数本身，发布状态由 `ensure_accepting_applications` 负责。
    pub fn record_application(&mut self, now: Timestamp) -> DomainResult<()> {
        self.ensure_capacity_available()?;
        self.current_applicants += 1;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn published(max: Option<u32>) -> Project {
        Project::new(
            UserId::generate(),
            "Rust internship",
            ProjectStatus::Published,
            max,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_zero_capacity() {
        let result = Project::new(
            UserId::generate(),
            "x",
            ProjectStatus::Draft,
            Some(0),
            Utc::now(),
        );
        assert!(matches!(result, Err(DomainError::InvalidArgument { .. })));
    }

    #[test]
    fn draft_project_does_not_accept_applications() {
        let mut project = published(None);
        project.status = ProjectStatus::Draft;
        assert_eq!(
            project.ensure_accepting_applications(),
            Err(DomainError::ProjectNotPublished {
                status: "DRAFT".to_string()
            })
        );
    }

    #[test]
    fn record_application_stops_at_capacity() {
        let mut project = published(Some(2));
        project.record_application(Utc::now()).unwrap();
        project.record_application(Utc::now()).unwrap();
        assert_eq!(project.remaining_capacity(), Some(0));

        let err = project.record_application(Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::CapacityReached { current: 2, max: 2 });
        assert_eq!(project.current_applicants, 2);
    }

    #[test]
    fn full_project_reports_capacity_before_accepting() {
        let mut project = published(Some(1));
        project.record_application(Utc::now()).unwrap();
        assert_eq!(
            project.ensure_accepting_applications(),
            Err(DomainError::CapacityReached { current: 1, max: 1 })
        );
    }

    #[test]
    fn closed_project_reports_status_even_when_full() {
        let mut project = published(Some(1));
        project.record_application(Utc::now()).unwrap();
        project.status = ProjectStatus::Closed;
        assert_eq!(
            project.ensure_accepting_applications(),
            Err(DomainError::ProjectNotPublished {
                status: "CLOSED".to_string()
            })
        );
    }

    #[test]
    fn capacity_message_keeps_client_facing_phrase() {
        let message = DomainError::CapacityReached { current: 2, max: 2 }.to_string();
        assert_eq!(message, "项目名额已满 (capacity reached): 2/2");
    }

    #[test]
    fn unlimited_project_keeps_counting() {
        let mut project = published(None);
        for _ in 0..10 {
            project.record_application(Utc::now()).unwrap();
        }
        assert_eq!(project.current_applicants, 10);
        assert_eq!(project.remaining_capacity(), None);
    }

    #[test]
    fn status_parses_from_storage_representation() {
        assert_eq!("CLOSED".parse::<ProjectStatus>().unwrap(), ProjectStatus::Closed);
        assert!("closed".parse::<ProjectStatus>().is_err());
    }
}
