use async_trait::async_trait;
use domain::{
    Application, ApplicationId, Project, ProjectId, RepositoryError, RepositoryResult, UserId,
};

/// 申请受理所需的持久化存储
///
/// 事务必须以可串行化隔离级别运行，并且对 (project_id, student_id) 有唯一约束兜底。
#[async_trait]
pub trait IntakeStore: Send + Sync {
    /// 开启一个可串行化事务
    async fn begin(&self) -> Result<Box<dyn IntakeTransaction>, RepositoryError>;

    async fn insert_project(&self, project: Project) -> RepositoryResult<Project>;
    async fn find_project(&self, id: ProjectId) -> RepositoryResult<Option<Project>>;
    async fn find_application(&self, id: ApplicationId) -> RepositoryResult<Option<Application>>;
    async fn list_applications(&self, project_id: ProjectId) -> RepositoryResult<Vec<Application>>;
}

/// 单个可串行化事务
///
/// 在 `commit` 之前的所有写入都不可见；丢弃或 `rollback` 会撤销全部写入。
#[async_trait]
pub trait IntakeTransaction: Send {
    async fn load_project(&mut self, id: ProjectId) -> RepositoryResult<Option<Project>>;

    async fn load_application(&mut self, id: ApplicationId)
        -> RepositoryResult<Option<Application>>;

    async fn application_exists(
        &mut self,
        project_id: ProjectId,
        student_id: UserId,
    ) -> RepositoryResult<bool>;

    /// 插入申请并递增所属项目的申请计数，返回递增后的计数
    async fn insert_application(&mut self, application: &Application) -> RepositoryResult<u32>;

    async fn update_application(&mut self, application: &Application) -> RepositoryResult<()>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;

    async fn rollback(self: Box<Self>) -> RepositoryResult<()>;
}
