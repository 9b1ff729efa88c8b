//! SMTP delivery through lettre, or a logging no-op when no relay is configured.

use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;

use crate::application::mailer::{EmailMessage, MailError, Mailer};
use crate::config::{EmailSettings, SmtpTls};
use crate::infra::error::InfraError;

#[derive(Clone)]
pub struct SmtpMailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings) -> Result<Self, InfraError> {
        let address = settings.from_address.parse::<Address>().map_err(|err| {
            InfraError::mail(format!(
                "invalid sender address `{}`: {err}",
                settings.from_address
            ))
        })?;
        let from = Mailbox::new(Some(settings.from_name.clone()), address);

        let transport = match settings.smtp_host.as_deref() {
            None => {
                info!(
                    target = "quire::mail",
                    "SMTP host not configured; outgoing email is logged only"
                );
                None
            }
            Some(host) => {
                let builder = match settings.tls {
                    SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                        .map_err(|err| InfraError::mail(err.to_string()))?,
                    SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                        .map_err(|err| InfraError::mail(err.to_string()))?,
                    SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
                }
                .port(settings.smtp_port);

                let builder = match (&settings.username, &settings.password) {
                    (Some(username), Some(password)) => builder
                        .credentials(Credentials::new(username.clone(), password.clone())),
                    _ => builder,
                };
                Some(builder.build())
            }
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let Some(transport) = &self.transport else {
            info!(
                target = "quire::mail",
                to = %message.to,
                subject = %message.subject,
                "email delivery disabled; dropping message"
            );
            return Ok(());
        };

        let to = message
            .to
            .parse::<Mailbox>()
            .map_err(|err| MailError::Address {
                address: message.to.clone(),
                reason: err.to_string(),
            })?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body)
            .map_err(|err| MailError::Build(err.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;
        info!(target = "quire::mail", subject = %message.subject, "email sent");
        Ok(())
    }
}
