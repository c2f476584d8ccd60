use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// 邮件发送失败，携带可读的诊断信息
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("mail transport failure: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self(diagnostic.into())
    }
}

/// 邮件发送通道
///
/// 实现方需要自行约束单次发送的耗时，队列不会取消进行中的发送。
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str)
        -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// 把模板键和模板数据转换为主题与正文
pub trait MessageRenderer: Send + Sync {
    fn render(&self, template_key: &str, data: &Map<String, Value>) -> RenderedMessage;
}

pub const TEMPLATE_APPLICATION_RECEIVED: &str = "application_received";
pub const TEMPLATE_STATUS_CHANGED: &str = "application_status_changed";

/// 固定主题表加上 `key: value` 形式的正文
#[derive(Debug, Default, Clone)]
pub struct PlainTextRenderer;

impl PlainTextRenderer {
    fn subject_for(template_key: &str, data: &Map<String, Value>) -> String {
        let title = data
            .get("project_title")
            .and_then(Value::as_str)
            .unwrap_or("your project");
        match template_key {
            TEMPLATE_APPLICATION_RECEIVED => format!("New application for {title}"),
            TEMPLATE_STATUS_CHANGED => format!("Your application to {title} was updated"),
            other => format!("Notification: {other}"),
        }
    }
}

impl MessageRenderer for PlainTextRenderer {
    fn render(&self, template_key: &str, data: &Map<String, Value>) -> RenderedMessage {
        let body = data
            .iter()
            .map(|(key, value)| match value {
                Value::String(text) => format!("{key}: {text}"),
                Value::Null => format!("{key}: -"),
                other => format!("{key}: {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n");

        RenderedMessage {
            subject: Self::subject_for(template_key, data),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_templates_get_fixed_subjects() {
        let mut data = Map::new();
        data.insert("project_title".into(), json!("Compiler internship"));
        data.insert("new_status".into(), json!("REJECTED"));
        data.insert("rejection_reason".into(), Value::Null);

        let message = PlainTextRenderer.render(TEMPLATE_STATUS_CHANGED, &data);
        assert_eq!(
            message.subject,
            "Your application to Compiler internship was updated"
        );
        assert!(message.body.contains("new_status: REJECTED"));
        assert!(message.body.contains("rejection_reason: -"));
    }

    #[test]
    fn unknown_template_falls_back_to_key() {
        let message = PlainTextRenderer.render("digest", &Map::new());
        assert_eq!(message.subject, "Notification: digest");
        assert!(message.body.is_empty());
    }
}
