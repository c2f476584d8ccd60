//! 申请相关的领域事件
//!
//! 事件只在业务事务提交之后产生，由通知分发器转换为投递任务。

use serde::{Deserialize, Serialize};

use crate::entities::{Application, ApplicationStatus, Project};
use crate::value_objects::{ApplicationId, ProjectId, Timestamp, UserId};

/// 申请相关的领域事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApplicationEvent {
    /// 学生提交了新申请
    Submitted {
        application_id: ApplicationId,
        project_id: ProjectId,
        project_title: String,
        owner_id: UserId,
        student_id: UserId,
        submitted_at: Timestamp,
    },

    /// 发布者更新了申请状态
    StatusChanged {
        application_id: ApplicationId,
        project_id: ProjectId,
        project_title: String,
        student_id: UserId,
        previous_status: ApplicationStatus,
        new_status: ApplicationStatus,
        rejection_reason: Option<String>,
        reviewed_by: UserId,
        reviewed_at: Timestamp,
    },
}

impl ApplicationEvent {
    /// 创建申请提交事件
    pub fn submitted(project: &Project, application: &Application) -> Self {
        ApplicationEvent::Submitted {
            application_id: application.id,
            project_id: project.id,
            project_title: project.title.clone(),
            owner_id: project.owner_id,
            student_id: application.student_id,
            submitted_at: application.created_at,
        }
    }

    /// 创建状态变更事件
    pub fn status_changed(
        project: &Project,
        application: &Application,
        previous_status: ApplicationStatus,
        reviewed_by: UserId,
        reviewed_at: Timestamp,
    ) -> Self {
        ApplicationEvent::StatusChanged {
            application_id: application.id,
            project_id: project.id,
            project_title: project.title.clone(),
            student_id: application.student_id,
            previous_status,
            new_status: application.status,
            rejection_reason: application.rejection_reason.clone(),
            reviewed_by,
            reviewed_at,
        }
    }

    pub fn application_id(&self) -> ApplicationId {
        match self {
            ApplicationEvent::Submitted { application_id, .. }
            | ApplicationEvent::StatusChanged { application_id, .. } => *application_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApplicationEvent::Submitted { .. } => "submitted",
            ApplicationEvent::StatusChanged { .. } => "status_changed",
        }
    }
}
