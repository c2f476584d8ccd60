//! 并发受理一致性测试
//!
//! 验证多个学生同时抢最后一个名额时，计数永远不会超过上限。

use std::sync::{Arc, Mutex};

use application::{
    ApplicationError, ApplicationIntakeDependencies, ApplicationIntakeService,
    CreateProjectRequest, DomainRecipientDirectory, IntakeSettings, IntakeStore,
    MemoryIntakeStore, NotificationDispatcher, NotificationQueue, QueueError, SubmitApplicationRequest,
    SystemClock,
};
use async_trait::async_trait;
use domain::{ApplicationStatus, JobId, NotificationPayload, Project, ProjectStatus, UserId};
use futures::future::join_all;

#[derive(Default)]
struct RecordingQueue {
    payloads: Mutex<Vec<NotificationPayload>>,
}

#[async_trait]
impl NotificationQueue for RecordingQueue {
    async fn enqueue(&self, payload: NotificationPayload) -> Result<JobId, QueueError> {
        self.payloads.lock().unwrap().push(payload);
        Ok(JobId::generate())
    }
}

struct TestServices {
    service: Arc<ApplicationIntakeService>,
    store: Arc<MemoryIntakeStore>,
    queue: Arc<RecordingQueue>,
}

impl TestServices {
    fn new() -> Self {
        let store = Arc::new(MemoryIntakeStore::default());
        let queue = Arc::new(RecordingQueue::default());
        let service = ApplicationIntakeService::new(ApplicationIntakeDependencies {
            store: store.clone(),
            dispatcher: Arc::new(NotificationDispatcher::new(
                queue.clone(),
                Arc::new(DomainRecipientDirectory::new("campus.test")),
            )),
            clock: Arc::new(SystemClock),
            settings: IntakeSettings::default(),
        });
        Self {
            service: Arc::new(service),
            store,
            queue,
        }
    }

    async fn published_project(&self, max_applicants: Option<u32>) -> Project {
        self.service
            .create_project(CreateProjectRequest {
                owner_id: UserId::generate(),
                title: "Compiler optimisation research".into(),
                status: ProjectStatus::Published,
                max_applicants,
            })
            .await
            .unwrap()
    }

    async fn submit(&self, project: &Project, student: UserId) -> Result<(), ApplicationError> {
        self.service
            .submit(SubmitApplicationRequest {
                project_id: project.id,
                student_id: student,
                cover_letter: "Keen to help.".into(),
                resume_url: None,
            })
            .await
            .map(|_| ())
    }
}

/// 并发提交，返回每个请求的结果
async fn submit_concurrently(
    services: &TestServices,
    project: &Project,
    students: Vec<UserId>,
) -> Vec<Result<(), ApplicationError>> {
    let tasks: Vec<_> = students
        .into_iter()
        .map(|student| {
            let service = services.service.clone();
            let project_id = project.id;
            tokio::spawn(async move {
                service
                    .submit(SubmitApplicationRequest {
                        project_id,
                        student_id: student,
                        cover_letter: "Keen to help.".into(),
                        resume_url: None,
                    })
                    .await
                    .map(|_| ())
            })
        })
        .collect();

    join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("submit task panicked"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_slot_is_granted_at_most_once() {
    const MAX: u32 = 5;
    let services = TestServices::new();
    let project = services.published_project(Some(MAX)).await;

    // 先填到 M-1
    for _ in 0..MAX - 1 {
        services.submit(&project, UserId::generate()).await.unwrap();
    }

    let results =
        submit_concurrently(&services, &project, (0..16).map(|_| UserId::generate()).collect())
            .await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    // 先提交者必然成功，其余全部落败
    assert_eq!(successes, 1, "{successes} submissions took the last slot");

    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                err,
                ApplicationError::Validation(_)
                    | ApplicationError::Conflict(_)
                    | ApplicationError::Transient(_)
            ),
            "unexpected loser error {err:?}"
        );
    }

    let stored = services.store.find_project(project.id).await.unwrap().unwrap();
    assert!(stored.current_applicants <= MAX);
    assert_eq!(stored.current_applicants, MAX);
    assert_eq!(
        services.store.application_count().await,
        stored.current_applicants as usize
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_students_racing_for_single_slot() {
    let services = TestServices::new();
    let project = services.published_project(Some(1)).await;

    let results =
        submit_concurrently(&services, &project, vec![UserId::generate(), UserId::generate()])
            .await;

    // 两个请求中没有任何一个会得到 NotFound
    assert!(results
        .iter()
        .all(|r| !matches!(r, Err(ApplicationError::NotFound { .. }))));

    let stored = services.store.find_project(project.id).await.unwrap().unwrap();
    assert_eq!(stored.current_applicants, 1);

    let applications = services.store.list_applications(project.id).await.unwrap();
    assert_eq!(applications.len(), 1);
    assert_eq!(applications[0].status, ApplicationStatus::Pending);

    // 一次成功只产生一条通知
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert_eq!(services.queue.payloads.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_student_submitting_twice_concurrently_gets_one_application() {
    let services = TestServices::new();
    let project = services.published_project(None).await;
    let student = UserId::generate();

    let results = submit_concurrently(&services, &project, vec![student; 8]).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, ApplicationError::Conflict(_) | ApplicationError::Transient(_))));

    let stored = services.store.find_project(project.id).await.unwrap().unwrap();
    assert_eq!(stored.current_applicants, 1);

    // 事后再提交必然冲突
    let err = services.submit(&project, student).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Conflict(_)));
}

#[tokio::test]
async fn successful_submit_adds_exactly_one_pending_application() {
    let services = TestServices::new();
    let project = services.published_project(Some(10)).await;
    services.submit(&project, UserId::generate()).await.unwrap();

    let before = services.store.find_project(project.id).await.unwrap().unwrap();
    let student = UserId::generate();
    services.submit(&project, student).await.unwrap();
    let after = services.store.find_project(project.id).await.unwrap().unwrap();

    assert_eq!(after.current_applicants, before.current_applicants + 1);
    let mine: Vec<_> = services
        .store
        .list_applications(project.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.student_id == student)
        .collect();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].status, ApplicationStatus::Pending);
}
