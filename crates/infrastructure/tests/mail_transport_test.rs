use std::time::Duration;

use application::MailTransport;
use infrastructure::HttpMailTransport;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer, timeout: Duration) -> HttpMailTransport {
    HttpMailTransport::new(
        format!("{}/v1/messages", server.uri()),
        "no-reply@marketplace.test",
        timeout,
    )
    .expect("build transport")
}

#[tokio::test]
async fn posts_message_to_relay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({
            "from": "no-reply@marketplace.test",
            "to": "owner@campus.test",
            "subject": "New application",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    transport(&server, Duration::from_secs(5))
        .send("owner@campus.test", "New application", "project_title: Robotics")
        .await
        .expect("relay accepts message");
}

#[tokio::test]
async fn non_success_status_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("relay overloaded"))
        .mount(&server)
        .await;

    let err = transport(&server, Duration::from_secs(5))
        .send("owner@campus.test", "subject", "body")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("relay overloaded"));
}

#[tokio::test]
async fn slow_relay_is_bounded_by_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = transport(&server, Duration::from_millis(200))
        .send("owner@campus.test", "subject", "body")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn unreachable_relay_is_a_failure() {
    let transport = HttpMailTransport::new(
        "http://127.0.0.1:9/v1/messages",
        "no-reply@marketplace.test",
        Duration::from_secs(1),
    )
    .expect("build transport");

    assert!(transport.send("owner@campus.test", "s", "b").await.is_err());
}
