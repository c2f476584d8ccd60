use std::sync::{Arc, Mutex};

use application::{
    ApplicationIntakeDependencies, ApplicationIntakeService, DeliveryQueue, DeliveryQueueConfig,
    DomainRecipientDirectory, IntakeSettings, MailTransport, MemoryIntakeStore,
    NotificationDispatcher, PlainTextRenderer, SystemClock, TransportError,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use web_api::{router, AppState, ACTOR_HEADER};

/// 记录所有发送内容的邮件通道
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub queue: Arc<DeliveryQueue>,
    pub transport: Arc<RecordingTransport>,
}

pub fn build_app() -> TestApp {
    let transport = Arc::new(RecordingTransport::default());
    let queue = Arc::new(DeliveryQueue::new(
        transport.clone(),
        Arc::new(PlainTextRenderer),
        Arc::new(SystemClock),
        DeliveryQueueConfig::default(),
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        queue.clone(),
        Arc::new(DomainRecipientDirectory::new("campus.test")),
    ));
    let intake_service = Arc::new(ApplicationIntakeService::new(ApplicationIntakeDependencies {
        store: Arc::new(MemoryIntakeStore::default()),
        dispatcher,
        clock: Arc::new(SystemClock),
        settings: IntakeSettings::default(),
    }));

    TestApp {
        router: router(AppState::new(intake_service, queue.clone())),
        queue,
        transport,
    }
}

impl TestApp {
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        actor: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header(ACTOR_HEADER, actor.to_string());
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}
