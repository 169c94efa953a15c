use crate::config::SmtpConfig;
use axum::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error};

/// Outbound mail seam. Handlers only see this trait so tests and other
/// transports can stand in for SMTP.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: String) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?.port(cfg.port);
        if !cfg.username.is_empty() {
            builder = builder
                .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()));
        }
        let from: Mailbox = cfg
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid SMTP_FROM address: {}", e))?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: String) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid recipient address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)?;

        self.transport.send(message).await.map_err(|e| {
            error!(error = %e, to, "smtp send failed");
            anyhow::anyhow!(e)
        })?;
        debug!(to, "email sent");
        Ok(())
    }
}

/// Email body for the password reset link.
pub fn reset_password_body(reset_url_base: &str, raw_token: &str) -> String {
    format!(
        "<h1>Click on the link to reset your password</h1><br>\
         <a href='{}/{}'>Reset password</a><br>\
         If you didn't forget your password, please ignore this email!",
        reset_url_base, raw_token
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_body_contains_full_link() {
        let body = reset_password_body("http://127.0.0.1:3000/reset-password", "abc123");
        assert!(body.contains("http://127.0.0.1:3000/reset-password/abc123"));
    }
}
