//! Outbound dispatch via SMTP (lettre).
//!
//! The subject line embeds the RFP identifier as `[Ref: <24-hex-id>]`,
//! the exact tag the correlation engine parses, so the two stay in
//! lock-step.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::MailConfig;
use crate::error::{Error, Result};
use crate::mail::Dispatcher;
use crate::rfp::model::Rfp;

/// SMTP dispatcher built from mail configuration.
pub struct SmtpDispatcher {
    config: MailConfig,
}

impl SmtpDispatcher {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Blocking SMTP send, run under `spawn_blocking`.
    fn send_blocking(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| Error::Transport(format!("SMTP relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| Error::Transport(format!("Invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| Error::Transport(format!("Invalid to address: {e}")))?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| Error::Transport(format!("Failed to build email: {e}")))?;

        transport
            .send(&email)
            .map_err(|e| Error::Transport(format!("SMTP send failed: {e}")))?;

        info!(to = %to, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for SmtpDispatcher {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let config = self.config.clone();
        let to = to.to_string();
        let subject = subject.to_string();
        let body = body.to_string();

        tokio::task::spawn_blocking(move || {
            SmtpDispatcher::new(config).send_blocking(&to, &subject, &body)
        })
        .await
        .map_err(|e| Error::Transport(format!("SMTP task panicked: {e}")))?
    }
}

/// Render the outbound RFP email: `(subject, plain-text body)`.
pub fn render_rfp_email(rfp: &Rfp) -> (String, String) {
    let subject = format!("RFP: {} [Ref: {}]", rfp.title, rfp.id);

    let mut body = String::with_capacity(1024);
    body.push_str(&format!("Request for Proposal: {}\n\n", rfp.title));
    body.push_str("Dear Vendor,\n\n");
    body.push_str("We are requesting a proposal for the following procurement:\n\n");
    body.push_str("Items Required:\n");
    for item in &rfp.structured.items {
        body.push_str(&format!("- {} (Quantity: {})", item.name, item.quantity));
        if !item.specs.is_empty() {
            body.push_str(&format!(" - {}", item.specs));
        }
        body.push('\n');
    }
    body.push('\n');

    if !rfp.structured.budget.is_empty() {
        body.push_str(&format!("Budget: {}\n", rfp.structured.budget));
    }
    if !rfp.structured.delivery_timeline.is_empty() {
        body.push_str(&format!(
            "Delivery Timeline: {}\n",
            rfp.structured.delivery_timeline
        ));
    }
    if !rfp.structured.payment_terms.is_empty() {
        body.push_str(&format!("Payment Terms: {}\n", rfp.structured.payment_terms));
    }
    if !rfp.structured.warranty.is_empty() {
        body.push_str(&format!(
            "Warranty Requirements: {}\n",
            rfp.structured.warranty
        ));
    }

    body.push_str("\nPlease reply to this email with your proposal including:\n");
    body.push_str("- Itemized pricing\n");
    body.push_str("- Delivery timeline\n");
    body.push_str("- Payment terms\n");
    body.push_str("- Warranty information\n");
    body.push_str("- Any exceptions or special conditions\n\n");
    body.push_str(&format!("RFP Reference ID: {}\n", rfp.id));
    body.push_str("Please include this reference ID in your reply subject line.\n\n");
    body.push_str("Thank you for your interest.\n");

    (subject, body)
}
