//! Outbound plain-text notifications.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address `{address}`: {reason}")]
    Address { address: String, reason: String },
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("mail transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

pub fn welcome_email(to: &str, username: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Welcome to Quire".to_string(),
        body: format!(
            "Hi {username},\n\nYour account is ready. You can sign in with this email address.\n"
        ),
    }
}

/// `base_url` receives the token as its `token` query parameter.
pub fn password_reset_email(to: &str, base_url: &str, token: &str, valid_minutes: i64) -> EmailMessage {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your Quire password".to_string(),
        body: format!(
            "We received a request to reset your password.\n\n\
             Open the following link to choose a new one:\n\
             {base_url}{separator}token={token}\n\n\
             This link expires in {valid_minutes} minutes. \
             If you did not ask for a reset, ignore this email.\n"
        ),
    }
}
