use domain::UserId;

/// 用户到收件地址的解析
pub trait RecipientDirectory: Send + Sync {
    fn address_of(&self, user: UserId) -> Option<String>;
}

/// 以 `<user-id>@<domain>` 作为收件地址
#[derive(Debug, Clone)]
pub struct DomainRecipientDirectory {
    domain: String,
}

impl DomainRecipientDirectory {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().trim().trim_start_matches('@').to_string(),
        }
    }
}

impl RecipientDirectory for DomainRecipientDirectory {
    fn address_of(&self, user: UserId) -> Option<String> {
        if self.domain.is_empty() {
            return None;
        }
        Some(format!("{user}@{}", self.domain))
    }
}
