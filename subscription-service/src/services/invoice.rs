//! Invoice rendering.
//!
//! The renderer is a seam: the built-in one produces a self-contained HTML
//! document, and any other format plugs in behind [`InvoiceRenderer`].

use askama::Template;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::PlanId;

/// Facts an invoice is rendered from.
#[derive(Debug, Clone)]
pub struct InvoiceDetails {
    pub invoice_id: String,
    pub brand: String,
    pub issued_at: DateTime<Utc>,
    pub company_name: String,
    pub company_email: String,
    pub billing_address: String,
    pub plan: PlanId,
    pub plan_label: String,
    pub job_limit: i32,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
    pub amount_minor_units: i64,
    pub currency: String,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderedInvoice {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

pub trait InvoiceRenderer: Send + Sync {
    fn render(&self, details: &InvoiceDetails) -> Result<RenderedInvoice, RenderError>;
}

/// `dd/mm/yyyy`.
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn format_period_end(date: Option<DateTime<Utc>>) -> String {
    date.map(format_date).unwrap_or_else(|| "N/A".to_string())
}

/// Amount in Indian digit grouping with two decimals, e.g. `₹1,23,456.00`.
/// Zero renders as `FREE`.
pub fn format_amount(minor_units: i64, currency: &str) -> String {
    if minor_units == 0 {
        return "FREE".to_string();
    }

    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    let symbol = match currency {
        "INR" => "₹".to_string(),
        other => format!("{} ", other),
    };

    format!(
        "{}{}{}.{:02}",
        sign,
        symbol,
        group_indian(abs / 100),
        abs % 100
    )
}

/// Last three digits, then groups of two: `1234567` -> `12,34,567`.
fn group_indian(value: u64) -> String {
    let digits = value.to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (mut head, tail) = digits.split_at(digits.len() - 3);
    let mut groups = Vec::new();
    while head.len() > 2 {
        let (rest, group) = head.split_at(head.len() - 2);
        groups.push(group);
        head = rest;
    }
    groups.push(head);
    groups.reverse();

    format!("{},{}", groups.join(","), tail)
}

#[derive(Template)]
#[template(path = "invoice.html")]
struct InvoiceTemplate<'a> {
    invoice_id: &'a str,
    brand: &'a str,
    issued: String,
    billed_to: &'a str,
    company_email: &'a str,
    billing_address: &'a str,
    plan_badge: String,
    plan_label: &'a str,
    period_start: String,
    period_end: String,
    amount: String,
    payment_reference: &'a str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlInvoiceRenderer;

impl InvoiceRenderer for HtmlInvoiceRenderer {
    fn render(&self, details: &InvoiceDetails) -> Result<RenderedInvoice, RenderError> {
        let billed_to = if details.company_name.trim().is_empty() {
            details.company_email.as_str()
        } else {
            details.company_name.as_str()
        };

        let template = InvoiceTemplate {
            invoice_id: &details.invoice_id,
            brand: &details.brand,
            issued: format_date(details.issued_at),
            billed_to,
            company_email: &details.company_email,
            billing_address: &details.billing_address,
            plan_badge: details.plan.as_str().to_uppercase(),
            plan_label: &details.plan_label,
            period_start: format_date(details.period_start),
            period_end: format_period_end(details.period_end),
            amount: format_amount(details.amount_minor_units, &details.currency),
            payment_reference: details
                .payment_id
                .as_deref()
                .or(details.order_id.as_deref())
                .unwrap_or_default(),
        };

        Ok(RenderedInvoice {
            filename: format!("{}.html", details.invoice_id),
            content_type: "text/html; charset=utf-8".to_string(),
            bytes: template.render()?.into_bytes(),
        })
    }
}
