// src/mailer.rs
//
// SMTP delivery for rendered invoices, behind a trait so the dispatcher can
// be exercised without a live mail server.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::Path;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends the invoice email with the stored PDF attached.
    async fn send_invoice(&self, to: &str, attachment: &Path) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    pub from_name: String,
    pub subject: String,
    pub template_path: Option<String>,
}

impl SmtpConfig {
    pub fn from_env() -> Result<SmtpConfig, String> {
        let host = std::env::var("SMTP_HOST").map_err(|_| "SMTP_HOST must be set".to_string())?;
        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(587);
        let from_email =
            std::env::var("FROM_EMAIL").map_err(|_| "FROM_EMAIL must be set".to_string())?;

        Ok(SmtpConfig {
            host,
            port,
            username: std::env::var("SMTP_USER_NAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            from_email,
            from_name: std::env::var("FROM_NAME").unwrap_or_default(),
            subject: std::env::var("EMAIL_SUBJECT")
                .unwrap_or_else(|_| "Invoice for the next billing".to_string()),
            template_path: std::env::var("EMAIL_TEMPLATE_PATH").ok(),
        })
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<SmtpMailer, String> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| format!("failed to create smtp transport: {e}"))?;
        builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(SmtpMailer {
            transport: builder.build(),
            config,
        })
    }

    pub fn from_env() -> Result<SmtpMailer, String> {
        SmtpMailer::new(SmtpConfig::from_env()?)
    }

    fn body_html(&self) -> String {
        if let Some(path) = &self.config.template_path {
            match std::fs::read_to_string(Path::new(path).join("invoice.html")) {
                Ok(template) => return template,
                Err(e) => log::warn!("email template read error path={path} error={e}"),
            }
        }
        "<p>Thank you for using our services.</p>".to_string()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_invoice(&self, to: &str, attachment: &Path) -> Result<(), String> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| format!("invalid from address: {e}"))?;
        let to: Mailbox = to.parse().map_err(|e| format!("invalid to address: {e}"))?;

        let pdf = tokio::fs::read(attachment)
            .await
            .map_err(|e| format!("error reading attachment {}: {e}", attachment.display()))?;
        let pdf_type = ContentType::parse("application/pdf")
            .map_err(|e| format!("invalid attachment content type: {e}"))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(self.config.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(self.body_html()),
                    )
                    .singlepart(Attachment::new("invoice.pdf".to_string()).body(pdf, pdf_type)),
            )
            .map_err(|e| format!("failed to build email: {e}"))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| format!("failed to send email: {e}"))?;

        Ok(())
    }
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .finish()
    }
}
