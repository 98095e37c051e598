//! Core entities: RFP, vendor, proposal.
//!
//! Wire names are camelCase to match the JSON contracts consumed by the
//! dashboard and embedded in AI prompts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::new_object_id;
use crate::rfp::status::RfpStatus;

/// A procurement request, in both raw and structured form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rfp {
    pub id: String,
    pub title: String,
    pub raw_prompt: String,
    pub structured: StructuredTerms,
    pub status: RfpStatus,
    /// Vendor ids this RFP was dispatched to. Empty until sent.
    pub vendors_sent_to: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rfp {
    /// Create a new draft RFP. The title is the first 100 characters of
    /// the prompt.
    pub fn new(prompt: &str, structured: StructuredTerms) -> Self {
        let now = Utc::now();
        Self {
            id: new_object_id(),
            title: prompt.chars().take(100).collect::<String>().trim().to_string(),
            raw_prompt: prompt.to_string(),
            structured,
            status: RfpStatus::Draft,
            vendors_sent_to: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Structured procurement terms extracted from the raw prompt.
/// Fields are empty strings when the prompt did not mention them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredTerms {
    #[serde(default)]
    pub items: Vec<RfpItem>,
    #[serde(default)]
    pub budget: String,
    #[serde(default)]
    pub delivery_timeline: String,
    #[serde(default)]
    pub payment_terms: String,
    #[serde(default)]
    pub warranty: String,
}

/// One line item in a procurement request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfpItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub specs: String,
}

/// A correspondence target. Exactly one vendor per email address; the
/// email is the correlation key for inbound senders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub company: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vendor {
    /// Create a new vendor. The email is lowercased so sender matching
    /// is case-insensitive.
    pub fn new(name: &str, email: &str, company: &str, notes: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_object_id(),
            name: name.to_string(),
            email: email.trim().to_lowercase(),
            company: company.to_string(),
            notes: notes.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One vendor's reply to exactly one RFP. At most one per
/// (rfp, vendor) pair; later replies update the existing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub rfp_id: String,
    pub vendor_id: String,
    /// Verbatim message body, retained for audit and re-extraction.
    pub raw_email_body: String,
    pub extracted: ExtractedTerms,
    /// 0–100, set by the evaluation run. `None` until scored.
    pub ai_score: Option<f64>,
    pub ai_summary: String,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(
        rfp_id: &str,
        vendor_id: &str,
        raw_email_body: &str,
        extracted: ExtractedTerms,
        received_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_object_id(),
            rfp_id: rfp_id.to_string(),
            vendor_id: vendor_id.to_string(),
            raw_email_body: raw_email_body.to_string(),
            extracted,
            ai_score: None,
            ai_summary: String::new(),
            received_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Proposal terms extracted from a vendor email.
/// The all-default value is the graceful-degradation shape stored when
/// extraction fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTerms {
    #[serde(default)]
    pub total_price: String,
    #[serde(default)]
    pub item_breakdown: Vec<ItemQuote>,
    #[serde(default)]
    pub delivery_timeline: String,
    #[serde(default)]
    pub payment_terms: String,
    #[serde(default)]
    pub warranty: String,
    #[serde(default)]
    pub exceptions: String,
}

/// One quoted line item inside a vendor proposal. Numbers are carried
/// as the AI produced them; semantic correctness is not validated here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuote {
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default)]
    pub total_price: f64,
    #[serde(default)]
    pub notes: String,
}
