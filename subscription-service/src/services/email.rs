use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not enabled: {0}")]
    NotEnabled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub from_name: Option<String>,
    pub attachments: Vec<EmailAttachment>,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Returns the provider's message id when it reports one.
    async fn send(&self, email: &EmailMessage) -> Result<Option<String>, ProviderError>;
    async fn health_check(&self) -> Result<(), ProviderError>;
    fn is_enabled(&self) -> bool;
}

pub struct SmtpEmailProvider {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpEmailProvider {
    pub fn new(config: SmtpConfig) -> Result<Self, ProviderError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| {
                ProviderError::Configuration(format!("Failed to create SMTP relay: {}", e))
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }
}

fn build_message(
    email: &EmailMessage,
    from: Mailbox,
) -> Result<Message, ProviderError> {
    let to_mailbox: Mailbox = email
        .to
        .parse()
        .map_err(|e| ProviderError::InvalidRecipient(format!("Invalid recipient: {}", e)))?;

    let body = match (&email.body_text, &email.body_html) {
        (Some(text), Some(html)) => MultiPart::alternative_plain_html(text.clone(), html.clone()),
        (Some(text), None) => MultiPart::alternative().singlepart(SinglePart::plain(text.clone())),
        (None, Some(html)) => MultiPart::alternative().singlepart(SinglePart::html(html.clone())),
        (None, None) => {
            return Err(ProviderError::SendFailed(
                "Email must have either text or HTML body".to_string(),
            ));
        }
    };

    let mut mixed = MultiPart::mixed().multipart(body);
    for attachment in &email.attachments {
        let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
            ProviderError::SendFailed(format!(
                "Invalid attachment content type {}: {}",
                attachment.content_type, e
            ))
        })?;
        mixed = mixed.singlepart(
            Attachment::new(attachment.filename.clone())
                .body(attachment.bytes.clone(), content_type),
        );
    }

    Message::builder()
        .from(from)
        .to(to_mailbox)
        .subject(&email.subject)
        .multipart(mixed)
        .map_err(|e| ProviderError::SendFailed(format!("Failed to build message: {}", e)))
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send(&self, email: &EmailMessage) -> Result<Option<String>, ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::NotEnabled(
                "SMTP email provider is not enabled".to_string(),
            ));
        }

        let transport = self.transport.as_ref().ok_or_else(|| {
            ProviderError::Configuration("SMTP transport not initialized".to_string())
        })?;

        let from_name = email.from_name.as_ref().unwrap_or(&self.config.from_name);
        let from_mailbox: Mailbox = format!("{} <{}>", from_name, self.config.from_email)
            .parse()
            .map_err(|e| ProviderError::Configuration(format!("Invalid from address: {}", e)))?;

        let message = build_message(email, from_mailbox)?;

        let response = transport
            .send(message)
            .await
            .map_err(|e| ProviderError::SendFailed(format!("Failed to send email: {}", e)))?;

        let provider_id = response.message().next().map(|s| s.to_string());

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "Email sent successfully"
        );

        Ok(provider_id)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if !self.config.enabled {
            return Ok(());
        }

        let transport = self.transport.as_ref().ok_or_else(|| {
            ProviderError::Configuration("SMTP transport not initialized".to_string())
        })?;

        transport.test_connection().await.map_err(|e| {
            ProviderError::Connection(format!("SMTP connection test failed: {}", e))
        })?;

        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Records messages instead of sending them. With `failing` set, every send
/// errors after being counted.
pub struct MockEmailProvider {
    failing: bool,
    send_count: AtomicU64,
    sent: Mutex<Vec<EmailMessage>>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self {
            failing: false,
            send_count: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Default for MockEmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, email: &EmailMessage) -> Result<Option<String>, ProviderError> {
        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;

        if self.failing {
            return Err(ProviderError::SendFailed(
                "Mock email provider configured to fail".to_string(),
            ));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "[MOCK] Email would be sent"
        );

        Ok(Some(format!("mock-email-{}", count)))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
