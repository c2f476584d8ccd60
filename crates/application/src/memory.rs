//! 进程内的申请存储
//!
//! 使用乐观并发控制模拟可串行化隔离：事务读取时记录版本号，
//! 提交时在存储锁内校验读集合，任何被并发修改过的读取都会让提交失败。
//! 存储锁的获取受锁等待上限约束。

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{
    Application, ApplicationId, DomainError, Project, ProjectId, RepositoryError,
    RepositoryResult, UserId,
};
use tokio::sync::{Mutex, MutexGuard};

use crate::repository::{IntakeStore, IntakeTransaction};

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);
const CAPACITY_CONSTRAINT: &str = "projects_capacity_check";

fn capacity_conflict(err: DomainError) -> RepositoryError {
    match err {
        DomainError::CapacityReached { .. } => RepositoryError::conflict(CAPACITY_CONSTRAINT),
        other => RepositoryError::storage_with_source("project counter update rejected", other),
    }
}

#[derive(Debug, Clone)]
struct Versioned<T> {
    value: T,
    version: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    projects: HashMap<ProjectId, Versioned<Project>>,
    applications: HashMap<ApplicationId, Versioned<Application>>,
    pairs: HashMap<(ProjectId, UserId), ApplicationId>,
}

async fn acquire(
    state: &Mutex<MemoryState>,
    lock_wait: Duration,
) -> RepositoryResult<MutexGuard<'_, MemoryState>> {
    tokio::time::timeout(lock_wait, state.lock())
        .await
        .map_err(|_| RepositoryError::LockTimeout)
}

/// 内存存储
#[derive(Clone)]
pub struct MemoryIntakeStore {
    state: Arc<Mutex<MemoryState>>,
    lock_wait: Duration,
}

impl MemoryIntakeStore {
    pub fn new(lock_wait: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            lock_wait,
        }
    }

    /// 已提交申请的总数
    pub async fn application_count(&self) -> usize {
        self.state.lock().await.applications.len()
    }
}

impl Default for MemoryIntakeStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_WAIT)
    }
}

#[async_trait]
impl IntakeStore for MemoryIntakeStore {
    async fn begin(&self) -> Result<Box<dyn IntakeTransaction>, RepositoryError> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            lock_wait: self.lock_wait,
            read_projects: HashMap::new(),
            read_applications: HashMap::new(),
            read_pairs: HashMap::new(),
            projects: HashMap::new(),
            applications: HashMap::new(),
            inserted_pairs: HashSet::new(),
            writes: Vec::new(),
        }))
    }

    async fn insert_project(&self, project: Project) -> RepositoryResult<Project> {
        let mut state = acquire(&self.state, self.lock_wait).await?;
        if state.projects.contains_key(&project.id) {
            return Err(RepositoryError::conflict("projects_pkey"));
        }
        state.projects.insert(
            project.id,
            Versioned {
                value: project.clone(),
                version: 1,
            },
        );
        Ok(project)
    }

    async fn find_project(&self, id: ProjectId) -> RepositoryResult<Option<Project>> {
        let state = acquire(&self.state, self.lock_wait).await?;
        Ok(state.projects.get(&id).map(|entry| entry.value.clone()))
    }

    async fn find_application(&self, id: ApplicationId) -> RepositoryResult<Option<Application>> {
        let state = acquire(&self.state, self.lock_wait).await?;
        Ok(state.applications.get(&id).map(|entry| entry.value.clone()))
    }

    async fn list_applications(&self, project_id: ProjectId) -> RepositoryResult<Vec<Application>> {
        let state = acquire(&self.state, self.lock_wait).await?;
        let mut applications: Vec<Application> = state
            .applications
            .values()
            .filter(|entry| entry.value.project_id == project_id)
            .map(|entry| entry.value.clone())
            .collect();
        applications.sort_by_key(|application| application.created_at);
        Ok(applications)
    }
}

#[derive(Debug)]
enum PendingWrite {
    InsertApplication(Application),
    IncrementApplicants(ProjectId),
    UpdateApplication(Application),
}

struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    lock_wait: Duration,
    // 读集合：读取时观察到的版本号，`None` 表示当时不存在
    read_projects: HashMap<ProjectId, Option<u64>>,
    read_applications: HashMap<ApplicationId, Option<u64>>,
    read_pairs: HashMap<(ProjectId, UserId), bool>,
    // 事务内视图，保证读到自己的写入
    projects: HashMap<ProjectId, Project>,
    applications: HashMap<ApplicationId, Application>,
    inserted_pairs: HashSet<(ProjectId, UserId)>,
    writes: Vec<PendingWrite>,
}

impl MemoryTransaction {
    fn validate_reads(&self, state: &MemoryState) -> RepositoryResult<()> {
        for (id, seen) in &self.read_projects {
            let current = state.projects.get(id).map(|entry| entry.version);
            if current != *seen {
                return Err(RepositoryError::SerializationFailure);
            }
        }
        for (id, seen) in &self.read_applications {
            let current = state.applications.get(id).map(|entry| entry.version);
            if current != *seen {
                return Err(RepositoryError::SerializationFailure);
            }
        }
        for (pair, existed) in &self.read_pairs {
            if state.pairs.contains_key(pair) != *existed {
                return Err(RepositoryError::SerializationFailure);
            }
        }
        Ok(())
    }

    /// 检查唯一约束与名额约束，返回计数更新后的项目
    fn check_constraints(
        &self,
        state: &MemoryState,
    ) -> RepositoryResult<HashMap<ProjectId, Project>> {
        let mut projected: HashMap<ProjectId, Project> = HashMap::new();
        for write in &self.writes {
            match write {
                PendingWrite::InsertApplication(application) => {
                    if state
                        .pairs
                        .contains_key(&(application.project_id, application.student_id))
                    {
                        return Err(RepositoryError::conflict(
                            "applications_project_id_student_id_key",
                        ));
                    }
                }
                PendingWrite::IncrementApplicants(project_id) => {
                    let project = match projected.entry(*project_id) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => {
                            let current = state
                                .projects
                                .get(project_id)
                                .ok_or(RepositoryError::NotFound)?;
                            entry.insert(current.value.clone())
                        }
                    };
                    let updated_at = self
                        .projects
                        .get(project_id)
                        .map_or(project.updated_at, |local| local.updated_at);
                    project
                        .record_application(updated_at)
                        .map_err(capacity_conflict)?;
                }
                PendingWrite::UpdateApplication(_) => {}
            }
        }
        Ok(projected)
    }
}

#[async_trait]
impl IntakeTransaction for MemoryTransaction {
    async fn load_project(&mut self, id: ProjectId) -> RepositoryResult<Option<Project>> {
        if let Some(project) = self.projects.get(&id) {
            return Ok(Some(project.clone()));
        }

        let state = acquire(&self.state, self.lock_wait).await?;
        let entry = state.projects.get(&id).cloned();
        drop(state);

        self.read_projects
            .entry(id)
            .or_insert(entry.as_ref().map(|e| e.version));
        Ok(entry.map(|e| {
            self.projects.insert(id, e.value.clone());
            e.value
        }))
    }

    async fn load_application(
        &mut self,
        id: ApplicationId,
    ) -> RepositoryResult<Option<Application>> {
        if let Some(application) = self.applications.get(&id) {
            return Ok(Some(application.clone()));
        }

        let state = acquire(&self.state, self.lock_wait).await?;
        let entry = state.applications.get(&id).cloned();
        drop(state);

        self.read_applications
            .entry(id)
            .or_insert(entry.as_ref().map(|e| e.version));
        Ok(entry.map(|e| {
            self.applications.insert(id, e.value.clone());
            e.value
        }))
    }

    async fn application_exists(
        &mut self,
        project_id: ProjectId,
        student_id: UserId,
    ) -> RepositoryResult<bool> {
        let pair = (project_id, student_id);
        if self.inserted_pairs.contains(&pair) {
            return Ok(true);
        }
        if let Some(existed) = self.read_pairs.get(&pair) {
            return Ok(*existed);
        }

        let state = acquire(&self.state, self.lock_wait).await?;
        let exists = state.pairs.contains_key(&pair);
        drop(state);

        self.read_pairs.insert(pair, exists);
        Ok(exists)
    }

    async fn insert_application(&mut self, application: &Application) -> RepositoryResult<u32> {
        let pair = (application.project_id, application.student_id);
        if self.inserted_pairs.contains(&pair) {
            return Err(RepositoryError::conflict(
                "applications_project_id_student_id_key",
            ));
        }

        if !self.projects.contains_key(&application.project_id) {
            self.load_project(application.project_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
        }
        let project = self
            .projects
            .get_mut(&application.project_id)
            .ok_or(RepositoryError::NotFound)?;

        project
            .record_application(application.created_at)
            .map_err(capacity_conflict)?;
        let count = project.current_applicants;

        self.inserted_pairs.insert(pair);
        self.applications
            .insert(application.id, application.clone());
        self.writes
            .push(PendingWrite::InsertApplication(application.clone()));
        self.writes
            .push(PendingWrite::IncrementApplicants(application.project_id));

        Ok(count)
    }

    async fn update_application(&mut self, application: &Application) -> RepositoryResult<()> {
        if !self.applications.contains_key(&application.id) {
            self.load_application(application.id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
        }
        self.applications
            .insert(application.id, application.clone());
        self.writes
            .push(PendingWrite::UpdateApplication(application.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let mut state = acquire(&self.state, self.lock_wait).await?;
        self.validate_reads(&state)?;
        let projected = self.check_constraints(&state)?;

        for write in &self.writes {
            match write {
                PendingWrite::InsertApplication(application) => {
                    state.pairs.insert(
                        (application.project_id, application.student_id),
                        application.id,
                    );
                    state.applications.insert(
                        application.id,
                        Versioned {
                            value: application.clone(),
                            version: 1,
                        },
                    );
                }
                PendingWrite::IncrementApplicants(_) => {}
                PendingWrite::UpdateApplication(application) => {
                    if let Some(entry) = state.applications.get_mut(&application.id) {
                        entry.value = application.clone();
                        entry.version += 1;
                    }
                }
            }
        }

        for (project_id, project) in projected {
            if let Some(entry) = state.projects.get_mut(&project_id) {
                entry.value = project;
                entry.version += 1;
            }
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> RepositoryResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::ProjectStatus;

    async fn store_with_project(max: Option<u32>) -> (MemoryIntakeStore, Project) {
        let store = MemoryIntakeStore::default();
        let project = Project::new(
            UserId::generate(),
            "Distributed systems research",
            ProjectStatus::Published,
            max,
            Utc::now(),
        )
        .unwrap();
        let project = store.insert_project(project).await.unwrap();
        (store, project)
    }

    fn application_for(project: &Project) -> Application {
        Application::pending(project.id, UserId::generate(), "hello", None, Utc::now())
    }

    #[tokio::test]
    async fn commit_publishes_insert_and_counter_together() {
        let (store, project) = store_with_project(Some(3)).await;
        let application = application_for(&project);

        let mut tx = store.begin().await.unwrap();
        tx.load_project(project.id).await.unwrap();
        assert_eq!(tx.insert_application(&application).await.unwrap(), 1);

        // 提交前对外不可见
        assert!(store.find_application(application.id).await.unwrap().is_none());
        assert_eq!(
            store.find_project(project.id).await.unwrap().unwrap().current_applicants,
            0
        );

        tx.commit().await.unwrap();
        assert!(store.find_application(application.id).await.unwrap().is_some());
        assert_eq!(
            store.find_project(project.id).await.unwrap().unwrap().current_applicants,
            1
        );
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let (store, project) = store_with_project(None).await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_application(&application_for(&project)).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.application_count().await, 0);
        assert_eq!(
            store.find_project(project.id).await.unwrap().unwrap().current_applicants,
            0
        );
    }

    #[tokio::test]
    async fn write_skew_on_last_slot_is_rejected() {
        let (store, project) = store_with_project(Some(1)).await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        // 两个事务都看到 0/1，都认为还有名额
        assert_eq!(first.load_project(project.id).await.unwrap().unwrap().current_applicants, 0);
        assert_eq!(second.load_project(project.id).await.unwrap().unwrap().current_applicants, 0);

        first.insert_application(&application_for(&project)).await.unwrap();
        second.insert_application(&application_for(&project)).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, RepositoryError::SerializationFailure));

        assert_eq!(store.application_count().await, 1);
        assert_eq!(
            store.find_project(project.id).await.unwrap().unwrap().current_applicants,
            1
        );
    }

    #[tokio::test]
    async fn phantom_duplicate_pair_is_rejected() {
        let (store, project) = store_with_project(None).await;
        let student = UserId::generate();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(!first.application_exists(project.id, student).await.unwrap());
        assert!(!second.application_exists(project.id, student).await.unwrap());

        let a = Application::pending(project.id, student, "a", None, Utc::now());
        let b = Application::pending(project.id, student, "b", None, Utc::now());
        first.insert_application(&a).await.unwrap();
        second.insert_application(&b).await.unwrap();

        first.commit().await.unwrap();
        assert!(second.commit().await.is_err());
        assert_eq!(store.application_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_pair_inside_one_transaction_conflicts() {
        let (store, project) = store_with_project(None).await;
        let student = UserId::generate();
        let mut tx = store.begin().await.unwrap();
        tx.insert_application(&Application::pending(project.id, student, "a", None, Utc::now()))
            .await
            .unwrap();
        let err = tx
            .insert_application(&Application::pending(project.id, student, "b", None, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn counter_refuses_to_pass_capacity_inside_one_transaction() {
        let (store, project) = store_with_project(Some(2)).await;
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.insert_application(&application_for(&project)).await.unwrap(), 1);
        assert_eq!(tx.insert_application(&application_for(&project)).await.unwrap(), 2);

        let err = tx
            .insert_application(&application_for(&project))
            .await
            .unwrap_err();
        match err {
            RepositoryError::Conflict { constraint } => {
                assert_eq!(constraint, CAPACITY_CONSTRAINT)
            }
            other => panic!("unexpected {other:?}"),
        }

        tx.commit().await.unwrap();
        assert_eq!(store.application_count().await, 2);
        assert_eq!(
            store.find_project(project.id).await.unwrap().unwrap().current_applicants,
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lock_wait_is_bounded() {
        let store = MemoryIntakeStore::new(Duration::from_millis(50));
        let _held = store.state.lock().await;

        let err = store.find_project(ProjectId::generate()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::LockTimeout));
    }
}
