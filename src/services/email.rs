use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::{config::SmtpConfig, services::otp::OTP_TTL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// "Send this message to that address" capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()>;
}

/// Password-reset OTP message.
pub fn otp_email(to: &str, code: &str) -> OutgoingEmail {
    let minutes = OTP_TTL.as_secs() / 60;
    OutgoingEmail {
        to: to.to_string(),
        subject: "Password Reset OTP".to_string(),
        text: format!(
            "Your OTP for password reset is: {code}\n\n\
             This OTP is valid for the next {minutes} minutes. If you did not request a \
             password reset, please ignore this email.\n\n\
             Best regards,\nUser Management System Team"
        ),
        html: format!(
            r#"<div style="font-family:Arial,sans-serif;line-height:1.6">
  <h2 style="color:#333">Password Reset OTP</h2>
  <p>Your OTP for password reset is:</p>
  <h1 style="color:#007BFF;letter-spacing:4px">{code}</h1>
  <p>This OTP is valid for the next {minutes} minutes. If you did not request a password reset, please ignore this email.</p>
  <br/>
  <p>Best regards,<br/>User Management System Team</p>
</div>"#
        ),
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        // Port 465 speaks implicit TLS; everything else upgrades with STARTTLS.
        let transport = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
                .port(config.port)
                .credentials(creds)
                .build()
        };

        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("Invalid SMTP_FROM address: {}", config.from))?;

        Ok(Self { transport, from })
    }

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        let to: Mailbox = email
            .to
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", email.to))?;

        let message = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(message)
            .await
            .context("Failed to send email")?;

        Ok(())
    }
}

/// Stand-in when SMTP is not configured: records that a message was dropped.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        tracing::warn!(to = %email.to, subject = %email.subject, "SMTP not configured, email not sent");
        Ok(())
    }
}
