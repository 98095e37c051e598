//! Correlate an inbound email with the RFP it answers.
//!
//! Resolution order: reference tag in the subject, then the
//! In-Reply-To header, then the References header. Only when no token
//! is present at all does the recency fallback over the sender's open
//! RFPs apply; a token that resolves to no stored RFP is fatal for the
//! message. The sender must resolve to a known vendor before any of
//! this runs.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mail::InboundEmail;
use crate::rfp::model::{Rfp, Vendor};
use crate::store::Store;

static REF_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[Ref:\s*([0-9a-f]{24})\]").unwrap());
static RFP_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)RFP[:\s]+([0-9a-f]{24})").unwrap());
static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([0-9a-f]{24})").unwrap());

/// Pull an RFP id out of a subject line. Checks the `[Ref: <id>]` tag
/// first, then an `RFP: <id>` prefix.
pub fn scan_subject(subject: &str) -> Option<String> {
    REF_TAG
        .captures(subject)
        .or_else(|| RFP_PREFIX.captures(subject))
        .map(|c| c[1].to_lowercase())
}

/// Pull an RFP id embedded in a message-id, e.g.
/// `<rfp-507f1f77bcf86cd799439011@corp.example>`.
fn scan_message_id(message_id: &str) -> Option<String> {
    BARE_ID
        .captures(&message_id.to_lowercase())
        .map(|c| c[1].to_string())
}

/// Extract the first RFP id candidate from subject and threading
/// headers, in resolution order.
fn candidate_id(email: &InboundEmail) -> Option<String> {
    if let Some(id) = scan_subject(&email.subject) {
        return Some(id);
    }
    if let Some(id) = email.in_reply_to.as_deref().and_then(scan_message_id) {
        return Some(id);
    }
    email
        .references
        .iter()
        .find_map(|r| scan_message_id(r))
}

/// Resolve an inbound email to `(rfp, vendor)`.
///
/// Fails with `Error::Correlation` when the sender is not a known
/// vendor or no RFP can be attributed.
pub async fn correlate(store: &dyn Store, email: &InboundEmail) -> Result<(Rfp, Vendor)> {
    let sender = email.sender.trim().to_lowercase();
    if sender.is_empty() {
        return Err(Error::Correlation("email has no sender address".into()));
    }

    let vendor = store
        .find_vendor_by_email(&sender)
        .await?
        .ok_or_else(|| Error::Correlation(format!("sender {sender} is not a known vendor")))?;

    // An explicit reference token is authoritative: if it points at
    // nothing, the message is rejected rather than guessed at.
    if let Some(id) = candidate_id(email) {
        return match store.get_rfp(&id).await? {
            Some(rfp) => {
                debug!(rfp_id = %id, vendor = %vendor.email, "Correlated by reference id");
                Ok((rfp, vendor))
            }
            None => Err(Error::Correlation(format!(
                "referenced RFP not found: {id}"
            ))),
        };
    }

    let mut open = store.open_rfps_for_vendor(&vendor.id).await?;
    if open.is_empty() {
        return Err(Error::Correlation(format!(
            "no open RFP found for vendor {}",
            vendor.email
        )));
    }
    if open.len() > 1 {
        warn!(
            vendor = %vendor.email,
            candidates = open.len(),
            "Ambiguous reply, attributing to most recent open RFP"
        );
    }
    Ok((open.remove(0), vendor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::rfp::model::StructuredTerms;
    use crate::rfp::status::RfpStatus;
    use crate::store::LibSqlStore;

    fn email(sender: &str, subject: &str) -> InboundEmail {
        InboundEmail {
            sender: sender.to_string(),
            subject: subject.to_string(),
            in_reply_to: None,
            references: Vec::new(),
            body_text: "quote attached".to_string(),
            date: Utc::now(),
        }
    }

    async fn seed(store: &LibSqlStore) -> (Rfp, Vendor) {
        let vendor = Vendor::new("Acme", "sales@acme.example", "", "");
        store.insert_vendor(&vendor).await.unwrap();

        let mut rfp = Rfp::new("Laptops for engineering", StructuredTerms::default());
        rfp.status = RfpStatus::Sent;
        store.insert_rfp(&rfp).await.unwrap();
        store
            .set_rfp_recipients(&rfp.id, &[vendor.id.clone()])
            .await
            .unwrap();
        store
            .update_rfp_status(&rfp.id, RfpStatus::Sent)
            .await
            .unwrap();
        (store.get_rfp(&rfp.id).await.unwrap().unwrap(), vendor)
    }

    #[test]
    fn scan_subject_finds_ref_tag() {
        assert_eq!(
            scan_subject("Re: RFP: Laptops [Ref: 507f1f77bcf86cd799439011]"),
            Some("507f1f77bcf86cd799439011".to_string())
        );
    }

    #[test]
    fn scan_subject_is_case_insensitive_and_lowercases() {
        assert_eq!(
            scan_subject("RE: [REF: 507F1F77BCF86CD799439011]"),
            Some("507f1f77bcf86cd799439011".to_string())
        );
    }

    #[test]
    fn scan_subject_falls_back_to_rfp_prefix() {
        assert_eq!(
            scan_subject("Regarding RFP: 507f1f77bcf86cd799439011"),
            Some("507f1f77bcf86cd799439011".to_string())
        );
        assert_eq!(scan_subject("Quarterly newsletter"), None);
    }

    #[test]
    fn scan_message_id_finds_embedded_id() {
        assert_eq!(
            scan_message_id("<rfp-507f1f77bcf86cd799439011@corp.example>"),
            Some("507f1f77bcf86cd799439011".to_string())
        );
        assert_eq!(scan_message_id("<hello@corp.example>"), None);
    }

    #[tokio::test]
    async fn correlates_by_subject_tag() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let (rfp, vendor) = seed(&store).await;

        let msg = email(
            "sales@acme.example",
            &format!("Re: RFP: Laptops [Ref: {}]", rfp.id),
        );
        let (found, v) = correlate(&store, &msg).await.unwrap();
        assert_eq!(found.id, rfp.id);
        assert_eq!(v.id, vendor.id);
    }

    #[tokio::test]
    async fn correlates_by_in_reply_to_header() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let (rfp, _) = seed(&store).await;

        let mut msg = email("sales@acme.example", "Re: your request");
        msg.in_reply_to = Some(format!("<rfp-{}@corp.example>", rfp.id));
        let (found, _) = correlate(&store, &msg).await.unwrap();
        assert_eq!(found.id, rfp.id);
    }

    #[tokio::test]
    async fn correlates_by_references_header() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let (rfp, _) = seed(&store).await;

        let mut msg = email("sales@acme.example", "Re: your request");
        msg.references = vec![
            "<unrelated@corp.example>".to_string(),
            format!("<rfp-{}@corp.example>", rfp.id),
        ];
        let (found, _) = correlate(&store, &msg).await.unwrap();
        assert_eq!(found.id, rfp.id);
    }

    #[tokio::test]
    async fn falls_back_to_most_recent_open_rfp() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let (rfp, _) = seed(&store).await;

        let msg = email("sales@acme.example", "Our quotation");
        let (found, _) = correlate(&store, &msg).await.unwrap();
        assert_eq!(found.id, rfp.id);
    }

    #[tokio::test]
    async fn sender_case_is_normalized() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let (rfp, _) = seed(&store).await;

        let msg = email("SALES@Acme.Example", "Our quotation");
        let (found, _) = correlate(&store, &msg).await.unwrap();
        assert_eq!(found.id, rfp.id);
    }

    #[tokio::test]
    async fn unknown_sender_is_a_correlation_error() {
        let store = LibSqlStore::new_memory().await.unwrap();
        seed(&store).await;

        let msg = email("stranger@nowhere.example", "hello");
        let err = correlate(&store, &msg).await.unwrap_err();
        assert!(matches!(err, Error::Correlation(_)));
    }

    #[tokio::test]
    async fn known_vendor_without_open_rfp_is_a_correlation_error() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let vendor = Vendor::new("Lone", "lone@vendor.example", "", "");
        store.insert_vendor(&vendor).await.unwrap();

        let msg = email("lone@vendor.example", "unsolicited quote");
        let err = correlate(&store, &msg).await.unwrap_err();
        assert!(matches!(err, Error::Correlation(_)));
    }

    #[tokio::test]
    async fn dangling_reference_is_fatal_even_with_an_open_rfp() {
        let store = LibSqlStore::new_memory().await.unwrap();
        // The vendor has exactly one open RFP the fallback could pick.
        let (rfp, _) = seed(&store).await;

        // References an id that resolves to nothing.
        let msg = email(
            "sales@acme.example",
            "Re: [Ref: 000000000000000000000000]",
        );
        let err = correlate(&store, &msg).await.unwrap_err();
        assert!(matches!(err, Error::Correlation(_)));
        // The open RFP must not be attributed by the recency fallback.
        assert!(err.to_string().contains("000000000000000000000000"));
        assert_ne!(rfp.id, "000000000000000000000000");
    }

    #[tokio::test]
    async fn dangling_in_reply_to_is_fatal_too() {
        let store = LibSqlStore::new_memory().await.unwrap();
        seed(&store).await;

        let mut msg = email("sales@acme.example", "Re: your request");
        msg.in_reply_to = Some("<rfp-feedfacefeedfacefeedface@corp.example>".to_string());
        let err = correlate(&store, &msg).await.unwrap_err();
        assert!(matches!(err, Error::Correlation(_)));
    }
}
