//! Ingestion cycle: fetch unread replies, correlate, extract, upsert.
//!
//! One bad message never aborts the batch. Every fetched message
//! produces a tagged outcome so callers can report exactly what
//! happened to each reply.

use tracing::{error, info};

use crate::ai::StructuringAdapter;
use crate::error::Result;
use crate::ingest::correlation;
use crate::mail::{InboundEmail, Mailbox};
use crate::store::{ProposalUpsert, Store};

/// Per-message result of one ingestion cycle. `result` carries the
/// stored proposal id on success.
#[derive(Debug)]
pub struct IngestOutcome {
    pub sender: String,
    pub subject: String,
    pub result: Result<String>,
}

/// Run one full ingestion cycle against the mailbox.
///
/// Returns one outcome per fetched message; only a mailbox fetch
/// failure is a cycle-level error.
pub async fn run_cycle(
    store: &dyn Store,
    adapter: &StructuringAdapter,
    mailbox: &dyn Mailbox,
) -> Result<Vec<IngestOutcome>> {
    let emails = mailbox.fetch_unread().await?;
    info!(count = emails.len(), "Ingestion cycle started");

    let mut outcomes = Vec::with_capacity(emails.len());
    for email in &emails {
        let result = process_email(store, adapter, email).await;
        if let Err(e) = &result {
            error!(sender = %email.sender, subject = %email.subject, error = %e, "Failed to ingest email");
        }
        outcomes.push(IngestOutcome {
            sender: email.sender.clone(),
            subject: email.subject.clone(),
            result,
        });
    }

    let ok = outcomes.iter().filter(|o| o.result.is_ok()).count();
    info!(
        total = outcomes.len(),
        succeeded = ok,
        "Ingestion cycle finished"
    );
    Ok(outcomes)
}

/// Process a single inbound email end to end. Returns the proposal id.
async fn process_email(
    store: &dyn Store,
    adapter: &StructuringAdapter,
    email: &InboundEmail,
) -> Result<String> {
    let (rfp, vendor) = correlation::correlate(store, email).await?;

    // Reject the transition before touching proposal state.
    let next_status = rfp.status.receive_response()?;

    let extracted = adapter.extract_proposal(&email.body_text).await;

    let proposal = store
        .upsert_proposal(&ProposalUpsert {
            rfp_id: rfp.id.clone(),
            vendor_id: vendor.id.clone(),
            raw_email_body: email.body_text.clone(),
            extracted,
            received_at: email.date,
        })
        .await?;

    if next_status != rfp.status {
        store.update_rfp_status(&rfp.id, next_status).await?;
    }

    info!(
        rfp_id = %rfp.id,
        vendor = %vendor.email,
        proposal_id = %proposal.id,
        "Proposal ingested"
    );
    Ok(proposal.id)
}
