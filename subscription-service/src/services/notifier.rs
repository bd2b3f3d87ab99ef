//! Activation notices: the "subscription activated" email with the invoice
//! attached.

use std::sync::Arc;

use askama::Template;
use async_trait::async_trait;
use thiserror::Error;

use super::email::{EmailAttachment, EmailMessage, EmailProvider, ProviderError};
use super::invoice::{
    format_amount, format_date, format_period_end, InvoiceDetails, InvoiceRenderer, RenderError,
};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn subscription_activated(&self, details: &InvoiceDetails) -> Result<(), NotifyError>;
}

#[derive(Template)]
#[template(path = "email/subscription_activated.html")]
struct ActivationEmailTemplate<'a> {
    greeting_name: &'a str,
    plan_label: &'a str,
    period_start: String,
    period_end: String,
    job_limit: i32,
    invoice_id: &'a str,
    payment_id: &'a str,
    order_id: &'a str,
    amount: String,
    has_attachment: bool,
}

pub fn activation_subject(details: &InvoiceDetails) -> String {
    format!(
        "Invoice {} - {} Plan Activation",
        details.invoice_id, details.plan
    )
}

fn activation_text(details: &InvoiceDetails, greeting_name: &str) -> String {
    format!(
        "Hi {},\n\nYour {} plan is now active.\n\nStarts: {}\nEnds: {}\nJob limit: {}\nInvoice ID: {}\nAmount: {}\n\nSubscriptions are non-refundable and non-transferable once activated.\n",
        greeting_name,
        details.plan_label,
        format_date(details.period_start),
        format_period_end(details.period_end),
        details.job_limit,
        details.invoice_id,
        format_amount(details.amount_minor_units, &details.currency),
    )
}

pub struct InvoiceNotifier {
    provider: Arc<dyn EmailProvider>,
    renderer: Arc<dyn InvoiceRenderer>,
    from_name: Option<String>,
}

impl InvoiceNotifier {
    pub fn new(
        provider: Arc<dyn EmailProvider>,
        renderer: Arc<dyn InvoiceRenderer>,
        from_name: Option<String>,
    ) -> Self {
        Self {
            provider,
            renderer,
            from_name,
        }
    }
}

#[async_trait]
impl Notifier for InvoiceNotifier {
    async fn subscription_activated(&self, details: &InvoiceDetails) -> Result<(), NotifyError> {
        // Render failure degrades to a notice without attachment.
        let attachment = match self.renderer.render(details) {
            Ok(rendered) => Some(EmailAttachment {
                filename: rendered.filename,
                content_type: rendered.content_type,
                bytes: rendered.bytes,
            }),
            Err(e) => {
                tracing::error!(
                    invoice_id = %details.invoice_id,
                    error = %e,
                    "Failed to render invoice, sending notice without attachment"
                );
                None
            }
        };

        let greeting_name = if details.company_name.trim().is_empty() {
            details.company_email.as_str()
        } else {
            details.company_name.as_str()
        };

        let html = ActivationEmailTemplate {
            greeting_name,
            plan_label: &details.plan_label,
            period_start: format_date(details.period_start),
            period_end: format_period_end(details.period_end),
            job_limit: details.job_limit,
            invoice_id: &details.invoice_id,
            payment_id: details.payment_id.as_deref().unwrap_or_default(),
            order_id: details.order_id.as_deref().unwrap_or_default(),
            amount: format_amount(details.amount_minor_units, &details.currency),
            has_attachment: attachment.is_some(),
        }
        .render()
        .map_err(RenderError::from)?;

        let message = EmailMessage {
            to: details.company_email.clone(),
            subject: activation_subject(details),
            body_text: Some(activation_text(details, greeting_name)),
            body_html: Some(html),
            from_name: self.from_name.clone(),
            attachments: attachment.into_iter().collect(),
        };

        self.provider.send(&message).await?;

        tracing::info!(
            to = %details.company_email,
            invoice_id = %details.invoice_id,
            "Subscription activation notice sent"
        );
        Ok(())
    }
}
