//! 邮件发送适配器

use std::time::Duration;

use application::notification::{MailTransport, TransportError};
use async_trait::async_trait;
use config::MailConfig;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailSetupError {
    #[error("mail relay url is required for the http transport")]
    MissingRelayUrl,
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// 通过 HTTP 邮件中继发送
///
/// 每次请求都受 `request_timeout` 约束；非 2xx 响应视为发送失败。
pub struct HttpMailTransport {
    client: reqwest::Client,
    endpoint: String,
    sender: String,
}

impl HttpMailTransport {
    pub fn new(
        endpoint: impl Into<String>,
        sender: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, MailSetupError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            sender: sender.into(),
        })
    }

    pub fn from_config(config: &MailConfig) -> Result<Self, MailSetupError> {
        let endpoint = config
            .relay_url
            .clone()
            .ok_or(MailSetupError::MissingRelayUrl)?;
        Self::new(endpoint, config.sender.clone(), config.request_timeout())
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        let request = RelayRequest {
            from: &self.sender,
            to: recipient,
            subject,
            body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::new(format!("mail relay timed out: {e}"))
                } else {
                    TransportError::new(format!("mail relay unreachable: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(TransportError::new(format!("HTTP {status}: {detail}")));
        }

        Ok(())
    }
}

/// 开发环境使用：只写日志，总是成功
#[derive(Debug, Default, Clone)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        tracing::info!(
            recipient,
            subject,
            body_len = body.len(),
            "mail transport disabled, message logged"
        );
        Ok(())
    }
}
