//! Backend-agnostic `Store` trait: single async interface for all
//! persistence of RFPs, vendors, and proposals.
//!
//! Uniqueness (vendor email, one proposal per (rfp, vendor) pair) is
//! enforced by the store itself, not by caller check-then-act.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::rfp::model::{ExtractedTerms, Proposal, Rfp, Vendor};
use crate::rfp::status::RfpStatus;

/// Input for the idempotent proposal upsert, keyed by (rfp, vendor).
#[derive(Debug, Clone)]
pub struct ProposalUpsert {
    pub rfp_id: String,
    pub vendor_id: String,
    pub raw_email_body: String,
    pub extracted: ExtractedTerms,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── RFPs ────────────────────────────────────────────────────────

    async fn insert_rfp(&self, rfp: &Rfp) -> Result<(), DatabaseError>;

    async fn get_rfp(&self, id: &str) -> Result<Option<Rfp>, DatabaseError>;

    /// All RFPs, most recently created first.
    async fn list_rfps(&self) -> Result<Vec<Rfp>, DatabaseError>;

    async fn update_rfp_status(&self, id: &str, status: RfpStatus) -> Result<(), DatabaseError>;

    /// Record the vendor set an RFP was dispatched to.
    async fn set_rfp_recipients(
        &self,
        id: &str,
        vendor_ids: &[String],
    ) -> Result<(), DatabaseError>;

    /// RFPs in `sent` or `responses_received` that list the given vendor
    /// as a recipient, most recently created first. Used by the
    /// correlation recency fallback.
    async fn open_rfps_for_vendor(&self, vendor_id: &str) -> Result<Vec<Rfp>, DatabaseError>;

    // ── Vendors ─────────────────────────────────────────────────────

    /// Insert a vendor. Fails with `DatabaseError::Constraint` when the
    /// email address is already taken.
    async fn insert_vendor(&self, vendor: &Vendor) -> Result<(), DatabaseError>;

    async fn get_vendor(&self, id: &str) -> Result<Option<Vendor>, DatabaseError>;

    /// Look up a vendor by (normalized) email address.
    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<Vendor>, DatabaseError>;

    /// All vendors, by display name.
    async fn list_vendors(&self) -> Result<Vec<Vendor>, DatabaseError>;

    // ── Proposals ───────────────────────────────────────────────────

    /// Create or update the proposal for `(rfp_id, vendor_id)` in a
    /// single statement. A stored proposal with a newer `received_at`
    /// is not overwritten by a stale write. Returns the stored row.
    async fn upsert_proposal(&self, upsert: &ProposalUpsert) -> Result<Proposal, DatabaseError>;

    /// Proposals for one RFP, most recently received first.
    async fn list_proposals(&self, rfp_id: &str) -> Result<Vec<Proposal>, DatabaseError>;

    /// Persist an evaluation score and summary on one proposal.
    async fn set_proposal_score(
        &self,
        id: &str,
        score: f64,
        summary: &str,
    ) -> Result<(), DatabaseError>;
}
