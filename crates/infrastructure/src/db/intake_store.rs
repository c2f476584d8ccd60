use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config::IntakeConfig;
use domain::{
    Application, ApplicationId, ApplicationStatus, Project, ProjectId, ProjectStatus,
    RepositoryError, RepositoryResult, UserId,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use application::repository::{IntakeStore, IntakeTransaction};

use super::{invalid_data, map_sqlx_err};

const PROJECT_COLUMNS: &str =
    "id, owner_id, title, status, max_applicants, current_applicants, created_at, updated_at";

const APPLICATION_COLUMNS: &str = "id, project_id, student_id, cover_letter, resume_url, status, \
     rejection_reason, reviewed_by, reviewed_at, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ProjectRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    status: String,
    max_applicants: Option<i32>,
    current_applicants: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProjectRecord> for Project {
    type Error = RepositoryError;

    fn try_from(value: ProjectRecord) -> Result<Self, Self::Error> {
        let status: ProjectStatus = value
            .status
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;
        let max_applicants = value
            .max_applicants
            .map(u32::try_from)
            .transpose()
            .map_err(|_| invalid_data("negative max_applicants"))?;
        let current_applicants = u32::try_from(value.current_applicants)
            .map_err(|_| invalid_data("negative current_applicants"))?;

        Ok(Project {
            id: ProjectId::from(value.id),
            owner_id: UserId::from(value.owner_id),
            title: value.title,
            status,
            max_applicants,
            current_applicants,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ApplicationRecord {
    id: Uuid,
    project_id: Uuid,
    student_id: Uuid,
    cover_letter: String,
    resume_url: Option<String>,
    status: String,
    rejection_reason: Option<String>,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRecord> for Application {
    type Error = RepositoryError;

    fn try_from(value: ApplicationRecord) -> Result<Self, Self::Error> {
        let status: ApplicationStatus = value
            .status
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;

        Ok(Application {
            id: ApplicationId::from(value.id),
            project_id: ProjectId::from(value.project_id),
            student_id: UserId::from(value.student_id),
            cover_letter: value.cover_letter,
            resume_url: value.resume_url,
            status,
            rejection_reason: value.rejection_reason,
            reviewed_by: value.reviewed_by.map(UserId::from),
            reviewed_at: value.reviewed_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

fn to_i32(value: u32, field: &str) -> RepositoryResult<i32> {
    i32::try_from(value).map_err(|_| invalid_data(format!("{field} out of range")))
}

/// 每个事务内生效的超时设置
#[derive(Debug, Clone, Copy)]
pub struct PgTransactionSettings {
    pub lock_timeout: Duration,
    pub statement_timeout: Duration,
}

impl Default for PgTransactionSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&IntakeConfig> for PgTransactionSettings {
    fn from(config: &IntakeConfig) -> Self {
        Self {
            lock_timeout: config.lock_wait_timeout(),
            statement_timeout: config.transaction_timeout(),
        }
    }
}

/// PostgreSQL 申请存储
///
/// 所有写事务都运行在 SERIALIZABLE 隔离级别，PostgreSQL 的 SSI
/// 会在提交时让写偏斜的一方以 40001 失败。
#[derive(Clone)]
pub struct PgIntakeStore {
    pool: PgPool,
    settings: PgTransactionSettings,
}

impl PgIntakeStore {
    pub fn new(pool: PgPool, settings: PgTransactionSettings) -> Self {
        Self { pool, settings }
    }
}

#[async_trait]
impl IntakeStore for PgIntakeStore {
    async fn begin(&self) -> Result<Box<dyn IntakeTransaction>, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        // set_config(..., true) 等价于 SET LOCAL，事务结束即失效
        sqlx::query(
            "SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)",
        )
        .bind(format!("{}ms", self.settings.lock_timeout.as_millis()))
        .bind(format!("{}ms", self.settings.statement_timeout.as_millis()))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        Ok(Box::new(PgIntakeTransaction { tx }))
    }

    async fn insert_project(&self, project: Project) -> RepositoryResult<Project> {
        let record = sqlx::query_as::<_, ProjectRecord>(&format!(
            r#"
            INSERT INTO projects (id, owner_id, title, status, max_applicants, current_applicants, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(Uuid::from(project.id))
        .bind(Uuid::from(project.owner_id))
        .bind(&project.title)
        .bind(project.status.as_str())
        .bind(
            project
                .max_applicants
                .map(|max| to_i32(max, "max_applicants"))
                .transpose()?,
        )
        .bind(to_i32(project.current_applicants, "current_applicants")?)
        .bind(project.created_at)
        .bind(project.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Project::try_from(record)
    }

    async fn find_project(&self, id: ProjectId) -> RepositoryResult<Option<Project>> {
        let record = sqlx::query_as::<_, ProjectRecord>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Project::try_from).transpose()
    }

    async fn find_application(&self, id: ApplicationId) -> RepositoryResult<Option<Application>> {
        let record = sqlx::query_as::<_, ApplicationRecord>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Application::try_from).transpose()
    }

    async fn list_applications(&self, project_id: ProjectId) -> RepositoryResult<Vec<Application>> {
        let records = sqlx::query_as::<_, ApplicationRecord>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE project_id = $1 ORDER BY created_at"
        ))
        .bind(Uuid::from(project_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Application::try_from).collect()
    }
}

struct PgIntakeTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IntakeTransaction for PgIntakeTransaction {
    async fn load_project(&mut self, id: ProjectId) -> RepositoryResult<Option<Project>> {
        let record = sqlx::query_as::<_, ProjectRecord>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Project::try_from).transpose()
    }

    async fn load_application(
        &mut self,
        id: ApplicationId,
    ) -> RepositoryResult<Option<Application>> {
        let record = sqlx::query_as::<_, ApplicationRecord>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Application::try_from).transpose()
    }

    async fn application_exists(
        &mut self,
        project_id: ProjectId,
        student_id: UserId,
    ) -> RepositoryResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM applications WHERE project_id = $1 AND student_id = $2)",
        )
        .bind(Uuid::from(project_id))
        .bind(Uuid::from(student_id))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)
    }

    async fn insert_application(&mut self, application: &Application) -> RepositoryResult<u32> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, project_id, student_id, cover_letter, resume_url, status,
                                      rejection_reason, reviewed_by, reviewed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::from(application.id))
        .bind(Uuid::from(application.project_id))
        .bind(Uuid::from(application.student_id))
        .bind(&application.cover_letter)
        .bind(application.resume_url.as_deref())
        .bind(application.status.as_str())
        .bind(application.rejection_reason.as_deref())
        .bind(application.reviewed_by.map(Uuid::from))
        .bind(application.reviewed_at)
        .bind(application.created_at)
        .bind(application.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;

        let count = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE projects
            SET current_applicants = current_applicants + 1, updated_at = $2
            WHERE id = $1
            RETURNING current_applicants
            "#,
        )
        .bind(Uuid::from(application.project_id))
        .bind(application.created_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        u32::try_from(count).map_err(|_| invalid_data("negative current_applicants"))
    }

    async fn update_application(&mut self, application: &Application) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET status = $2, rejection_reason = $3, reviewed_by = $4, reviewed_at = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(application.id))
        .bind(application.status.as_str())
        .bind(application.rejection_reason.as_deref())
        .bind(application.reviewed_by.map(Uuid::from))
        .bind(application.reviewed_at)
        .bind(application.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.commit().await.map_err(map_sqlx_err)
    }

    async fn rollback(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.rollback().await.map_err(map_sqlx_err)
    }
}
