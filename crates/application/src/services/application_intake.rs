use std::sync::Arc;
use std::time::Duration;

use config::IntakeConfig;
use domain::{
    Application, ApplicationEvent, ApplicationId, ApplicationStatus, Project,
    ProjectId, ProjectStatus, Timestamp, UserId,
};

use crate::{
    clock::Clock,
    error::{ApplicationError, ApplicationResult},
    notification::NotificationDispatcher,
    repository::{IntakeStore, IntakeTransaction},
};

#[derive(Debug, Clone)]
pub struct SubmitApplicationRequest {
    pub project_id: ProjectId,
    pub student_id: UserId,
    pub cover_letter: String,
    pub resume_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateStatusRequest {
    pub application_id: ApplicationId,
    pub actor_id: UserId, // 已认证的操作者
    pub new_status: ApplicationStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateProjectRequest {
    pub owner_id: UserId,
    pub title: String,
    pub status: ProjectStatus,
    pub max_applicants: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct IntakeSettings {
    /// 单个事务（含锁等待）的总时长上限
    pub transaction_timeout: Duration,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&IntakeConfig> for IntakeSettings {
    fn from(config: &IntakeConfig) -> Self {
        Self {
            transaction_timeout: config.transaction_timeout(),
        }
    }
}

pub struct ApplicationIntakeDependencies {
    pub store: Arc<dyn IntakeStore>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub settings: IntakeSettings,
}

/// 申请受理
///
/// 提交和审核都在一个可串行化事务内完成；通知只在提交成功之后发出。
/// 本服务从不自动重试，`Transient` 和并发冲突交给调用方决定。
pub struct ApplicationIntakeService {
    deps: ApplicationIntakeDependencies,
}

impl ApplicationIntakeService {
    pub fn new(deps: ApplicationIntakeDependencies) -> Self {
        Self { deps }
    }

    pub async fn create_project(
        &self,
        request: CreateProjectRequest,
    ) -> Result<Project, ApplicationError> {
        let project = Project::new(
            request.owner_id,
            request.title,
            request.status,
            request.max_applicants,
            self.deps.clock.now(),
        )?;

        let project = self.deps.store.insert_project(project).await?;
        tracing::info!(
            project_id = %project.id,
            owner_id = %project.owner_id,
            max_applicants = ?project.max_applicants,
            "project created"
        );
        Ok(project)
    }

    pub async fn get_project(&self, project_id: ProjectId) -> Result<Project, ApplicationError> {
        self.deps
            .store
            .find_project(project_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("project", project_id))
    }

    /// 学生提交申请
    pub async fn submit(
        &self,
        request: SubmitApplicationRequest,
    ) -> Result<Application, ApplicationError> {
        let now = self.deps.clock.now();
        let work = async {
            let mut tx = self.deps.store.begin().await?;
            let result = Self::submit_in(tx.as_mut(), &request, now).await;
            Self::finish(tx, result).await
        };
        let (project, application) = self.bounded("submit", work).await?;

        tracing::info!(
            application_id = %application.id,
            project_id = %project.id,
            student_id = %application.student_id,
            current_applicants = project.current_applicants,
            "application submitted"
        );

        self.deps
            .dispatcher
            .notify(ApplicationEvent::submitted(&project, &application))
            .await;

        Ok(application)
    }

    async fn submit_in(
        tx: &mut dyn IntakeTransaction,
        request: &SubmitApplicationRequest,
        now: Timestamp,
    ) -> ApplicationResult<(Project, Application)> {
        let mut project = tx
            .load_project(request.project_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("project", request.project_id))?;

        project.ensure_accepting_applications()?;

        if tx
            .application_exists(request.project_id, request.student_id)
            .await?
        {
            return Err(ApplicationError::Conflict(format!(
                "student {} has already applied to project {}",
                request.student_id, request.project_id
            )));
        }

        let application = Application::pending(
            project.id,
            request.student_id,
            request.cover_letter.clone(),
            request.resume_url.clone(),
            now,
        );
        project.current_applicants = tx.insert_application(&application).await?;
        project.updated_at = now;

        Ok((project, application))
    }

    /// 项目发布者审核申请
    pub async fn update_status(
        &self,
        request: UpdateStatusRequest,
    ) -> Result<Application, ApplicationError> {
        let now = self.deps.clock.now();
        let work = async {
            let mut tx = self.deps.store.begin().await?;
            let result = Self::update_status_in(tx.as_mut(), &request, now).await;
            Self::finish(tx, result).await
        };
        let (project, application, previous) = self.bounded("update_status", work).await?;

        tracing::info!(
            application_id = %application.id,
            reviewer_id = %request.actor_id,
            from = %previous,
            to = %application.status,
            "application status updated"
        );

        self.deps
            .dispatcher
            .notify(ApplicationEvent::status_changed(
                &project,
                &application,
                previous,
                request.actor_id,
                now,
            ))
            .await;

        Ok(application)
    }

    async fn update_status_in(
        tx: &mut dyn IntakeTransaction,
        request: &UpdateStatusRequest,
        now: Timestamp,
    ) -> ApplicationResult<(Project, Application, ApplicationStatus)> {
        let mut application = tx
            .load_application(request.application_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("application", request.application_id))?;

        let project = tx
            .load_project(application.project_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("project", application.project_id))?;

        if !project.is_owned_by(request.actor_id) {
            return Err(ApplicationError::Forbidden(
                "only the project owner can review applications".to_string(),
            ));
        }

        let previous = application.review(
            request.actor_id,
            request.new_status,
            request.reason.clone(),
            now,
        )?;
        tx.update_application(&application).await?;

        Ok((project, application, previous))
    }

    /// 发布者或申请人本人可见
    pub async fn get_application(
        &self,
        application_id: ApplicationId,
        actor_id: UserId,
    ) -> Result<Application, ApplicationError> {
        let application = self
            .deps
            .store
            .find_application(application_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("application", application_id))?;

        if application.student_id == actor_id {
            return Ok(application);
        }

        let project = self.get_project(application.project_id).await?;
        if project.is_owned_by(actor_id) {
            Ok(application)
        } else {
            Err(ApplicationError::Forbidden(
                "application is visible to its applicant and the project owner only".to_string(),
            ))
        }
    }

    pub async fn list_project_applications(
        &self,
        project_id: ProjectId,
        actor_id: UserId,
    ) -> Result<Vec<Application>, ApplicationError> {
        let project = self.get_project(project_id).await?;
        if !project.is_owned_by(actor_id) {
            return Err(ApplicationError::Forbidden(
                "only the project owner can list applications".to_string(),
            ));
        }

        Ok(self.deps.store.list_applications(project_id).await?)
    }

    async fn finish<T>(
        tx: Box<dyn IntakeTransaction>,
        result: ApplicationResult<T>,
    ) -> ApplicationResult<T> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// 超过事务时长上限时放弃整个工作单元；未提交的事务随之丢弃
    async fn bounded<T>(
        &self,
        operation: &'static str,
        work: impl std::future::Future<Output = ApplicationResult<T>>,
    ) -> ApplicationResult<T> {
        let limit = self.deps.settings.transaction_timeout;
        match tokio::time::timeout(limit, work).await {
            Ok(result) => {
                if let Err(err) = &result {
                    tracing::debug!(operation, error = %err, "transaction rolled back");
                }
                result
            }
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = limit.as_millis() as u64,
                    "transaction exceeded its time limit"
                );
                Err(ApplicationError::Transient(format!(
                    "{operation} exceeded the {}ms transaction limit",
                    limit.as_millis()
                )))
            }
        }
    }
}
