//! Application service tying the store, the structuring adapter, and
//! the mail boundary together. The HTTP layer and the poll loop both
//! call through here.

use std::sync::Arc;
use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use tracing::{info, warn};

use crate::ai::StructuringAdapter;
use crate::error::{DatabaseError, Error, Result};
use crate::evaluate::{self, EvaluationReport};
use crate::id::is_object_id;
use crate::ingest::{self, IngestOutcome};
use crate::mail::{Dispatcher, Mailbox, render_rfp_email};
use crate::rfp::model::{Proposal, Rfp, Vendor};
use crate::store::Store;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Per-vendor result of one dispatch.
#[derive(Debug)]
pub struct SendOutcome {
    pub vendor_id: String,
    pub email: String,
    pub result: Result<()>,
}

/// Result of dispatching an RFP to a vendor set.
#[derive(Debug)]
pub struct SendReport {
    pub rfp: Rfp,
    pub outcomes: Vec<SendOutcome>,
}

pub struct RfpService {
    store: Arc<dyn Store>,
    adapter: Arc<StructuringAdapter>,
    mailbox: Option<Arc<dyn Mailbox>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl RfpService {
    pub fn new(
        store: Arc<dyn Store>,
        adapter: Arc<StructuringAdapter>,
        mailbox: Option<Arc<dyn Mailbox>>,
        dispatcher: Option<Arc<dyn Dispatcher>>,
    ) -> Self {
        Self {
            store,
            adapter,
            mailbox,
            dispatcher,
        }
    }

    // ── RFPs ────────────────────────────────────────────────────────

    /// Structure a free-text procurement prompt and store it as a draft.
    pub async fn create_rfp(&self, prompt: &str) -> Result<Rfp> {
        let structured = self.adapter.structure(prompt).await?;
        let rfp = Rfp::new(prompt, structured);
        self.store.insert_rfp(&rfp).await?;
        info!(rfp_id = %rfp.id, title = %rfp.title, "RFP created");
        Ok(rfp)
    }

    pub async fn get_rfp(&self, id: &str) -> Result<Rfp> {
        // A malformed id can never exist; skip the store round-trip.
        if !is_object_id(id) {
            return Err(Error::NotFound {
                entity: "rfp",
                id: id.to_string(),
            });
        }
        self.store.get_rfp(id).await?.ok_or(Error::NotFound {
            entity: "rfp",
            id: id.to_string(),
        })
    }

    pub async fn list_rfps(&self) -> Result<Vec<Rfp>> {
        Ok(self.store.list_rfps().await?)
    }

    /// Dispatch a draft RFP to the given vendors.
    ///
    /// Each send is attempted independently; the RFP moves to `sent`
    /// when at least one succeeds. Only successfully reached vendors
    /// are recorded as recipients.
    pub async fn send_rfp(&self, id: &str, vendor_ids: &[String]) -> Result<SendReport> {
        if vendor_ids.is_empty() {
            return Err(Error::Validation("vendor list must not be empty".into()));
        }
        let dispatcher = self
            .dispatcher
            .as_ref()
            .ok_or_else(|| Error::Transport("outbound email is not configured".into()))?;

        let rfp = self.get_rfp(id).await?;
        let next_status = rfp.status.dispatch()?;

        let mut vendors = Vec::with_capacity(vendor_ids.len());
        for vendor_id in vendor_ids {
            if !is_object_id(vendor_id) {
                return Err(Error::NotFound {
                    entity: "vendor",
                    id: vendor_id.clone(),
                });
            }
            let vendor = self
                .store
                .get_vendor(vendor_id)
                .await?
                .ok_or(Error::NotFound {
                    entity: "vendor",
                    id: vendor_id.clone(),
                })?;
            vendors.push(vendor);
        }

        let (subject, body) = render_rfp_email(&rfp);
        let sends = vendors
            .iter()
            .map(|v| dispatcher.send(&v.email, &subject, &body));
        let results = join_all(sends).await;

        let outcomes: Vec<SendOutcome> = vendors
            .iter()
            .zip(results)
            .map(|(v, result)| SendOutcome {
                vendor_id: v.id.clone(),
                email: v.email.clone(),
                result,
            })
            .collect();

        let reached: Vec<String> = outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.vendor_id.clone())
            .collect();

        if reached.is_empty() {
            warn!(rfp_id = %id, "Every send failed, RFP stays in draft");
            return Err(Error::Transport(format!(
                "all {} sends failed",
                outcomes.len()
            )));
        }

        self.store.set_rfp_recipients(id, &reached).await?;
        self.store.update_rfp_status(id, next_status).await?;
        info!(
            rfp_id = %id,
            reached = reached.len(),
            attempted = outcomes.len(),
            "RFP dispatched"
        );

        let rfp = self.get_rfp(id).await?;
        Ok(SendReport { rfp, outcomes })
    }

    // ── Vendors ─────────────────────────────────────────────────────

    pub async fn create_vendor(
        &self,
        name: &str,
        email: &str,
        company: &str,
        notes: &str,
    ) -> Result<Vendor> {
        if name.trim().is_empty() {
            return Err(Error::Validation("vendor name must not be empty".into()));
        }
        let email = email.trim();
        if !EMAIL_SHAPE.is_match(email) {
            return Err(Error::Validation(format!(
                "invalid email address: {email}"
            )));
        }

        let vendor = Vendor::new(name.trim(), email, company, notes);
        match self.store.insert_vendor(&vendor).await {
            Ok(()) => {
                info!(vendor_id = %vendor.id, email = %vendor.email, "Vendor created");
                Ok(vendor)
            }
            Err(DatabaseError::Constraint(_)) => Err(Error::Validation(format!(
                "a vendor with email {} already exists",
                vendor.email
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_vendors(&self) -> Result<Vec<Vendor>> {
        Ok(self.store.list_vendors().await?)
    }

    // ── Proposals ───────────────────────────────────────────────────

    /// Proposals received for one RFP, most recent first.
    pub async fn list_proposals(&self, rfp_id: &str) -> Result<Vec<Proposal>> {
        self.get_rfp(rfp_id).await?;
        Ok(self.store.list_proposals(rfp_id).await?)
    }

    /// Run one mailbox ingestion cycle.
    pub async fn ingest_cycle(&self) -> Result<Vec<IngestOutcome>> {
        let mailbox = self
            .mailbox
            .as_ref()
            .ok_or_else(|| Error::Transport("inbound mailbox is not configured".into()))?;
        ingest::run_cycle(self.store.as_ref(), self.adapter.as_ref(), mailbox.as_ref()).await
    }

    /// Evaluate all proposals for one RFP and persist scores.
    pub async fn evaluate_rfp(&self, rfp_id: &str) -> Result<EvaluationReport> {
        evaluate::evaluate_rfp(self.store.as_ref(), self.adapter.as_ref(), rfp_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::ai::TextGenerator;
    use crate::rfp::status::RfpStatus;
    use crate::store::LibSqlStore;

    const STRUCTURED_JSON: &str = r#"{
        "items": [{"name": "laptop", "quantity": 10, "specs": "16GB"}],
        "budget": "$20,000",
        "deliveryTimeline": "4 weeks",
        "paymentTerms": "",
        "warranty": "1 year"
    }"#;

    struct StubGenerator;

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(STRUCTURED_JSON.to_string())
        }
    }

    /// Records sends; addresses listed in `fail` are rejected.
    struct StubDispatcher {
        sent: Mutex<Vec<(String, String)>>,
        fail: Vec<String>,
    }

    impl StubDispatcher {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: Vec::new(),
            }
        }

        fn failing_for(addresses: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: addresses.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl Dispatcher for StubDispatcher {
        async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
            if self.fail.iter().any(|f| f == to) {
                return Err(Error::Transport(format!("rejected by {to}")));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    async fn service_with(dispatcher: Option<Arc<dyn Dispatcher>>) -> RfpService {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let adapter = Arc::new(StructuringAdapter::new(Arc::new(StubGenerator)));
        RfpService::new(store, adapter, None, dispatcher)
    }

    #[tokio::test]
    async fn create_rfp_structures_and_stores_a_draft() {
        let service = service_with(None).await;
        let rfp = service.create_rfp("need 10 laptops, 16GB RAM").await.unwrap();

        assert_eq!(rfp.status, RfpStatus::Draft);
        assert_eq!(rfp.structured.items[0].name, "laptop");
        assert_eq!(rfp.title, "need 10 laptops, 16GB RAM");

        let fetched = service.get_rfp(&rfp.id).await.unwrap();
        assert_eq!(fetched.raw_prompt, "need 10 laptops, 16GB RAM");
    }

    #[tokio::test]
    async fn create_vendor_validates_email_shape() {
        let service = service_with(None).await;
        let err = service
            .create_vendor("Acme", "not-an-email", "", "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = service.create_vendor("", "a@b.example", "", "").await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn duplicate_vendor_email_is_a_validation_error() {
        let service = service_with(None).await;
        service
            .create_vendor("Acme", "sales@acme.example", "", "")
            .await
            .unwrap();
        let err = service
            .create_vendor("Acme Again", "Sales@Acme.Example", "", "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn send_rfp_dispatches_and_advances_status() {
        let dispatcher = Arc::new(StubDispatcher::new());
        let service = service_with(Some(dispatcher.clone())).await;

        let vendor = service
            .create_vendor("Acme", "sales@acme.example", "", "")
            .await
            .unwrap();
        let rfp = service.create_rfp("need 10 laptops").await.unwrap();

        let report = service
            .send_rfp(&rfp.id, &[vendor.id.clone()])
            .await
            .unwrap();

        assert_eq!(report.rfp.status, RfpStatus::Sent);
        assert_eq!(report.rfp.vendors_sent_to, vec![vendor.id.clone()]);
        assert!(report.outcomes[0].result.is_ok());

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "sales@acme.example");
        assert!(sent[0].1.contains(&format!("[Ref: {}]", rfp.id)));
    }

    #[tokio::test]
    async fn partial_send_failure_still_moves_to_sent() {
        let dispatcher = Arc::new(StubDispatcher::failing_for(&["down@vendor.example"]));
        let service = service_with(Some(dispatcher)).await;

        let good = service
            .create_vendor("Good", "sales@acme.example", "", "")
            .await
            .unwrap();
        let bad = service
            .create_vendor("Bad", "down@vendor.example", "", "")
            .await
            .unwrap();
        let rfp = service.create_rfp("need 10 laptops").await.unwrap();

        let report = service
            .send_rfp(&rfp.id, &[good.id.clone(), bad.id.clone()])
            .await
            .unwrap();

        assert_eq!(report.rfp.status, RfpStatus::Sent);
        // Only the reached vendor is recorded.
        assert_eq!(report.rfp.vendors_sent_to, vec![good.id]);
        assert!(report.outcomes[0].result.is_ok());
        assert!(report.outcomes[1].result.is_err());
    }

    #[tokio::test]
    async fn total_send_failure_keeps_the_draft() {
        let dispatcher = Arc::new(StubDispatcher::failing_for(&["sales@acme.example"]));
        let service = service_with(Some(dispatcher)).await;

        let vendor = service
            .create_vendor("Acme", "sales@acme.example", "", "")
            .await
            .unwrap();
        let rfp = service.create_rfp("need 10 laptops").await.unwrap();

        let err = service.send_rfp(&rfp.id, &[vendor.id]).await.unwrap_err();
        assert_eq!(err.kind(), "transport");

        let stored = service.get_rfp(&rfp.id).await.unwrap();
        assert_eq!(stored.status, RfpStatus::Draft);
        assert!(stored.vendors_sent_to.is_empty());
    }

    #[tokio::test]
    async fn already_sent_rfp_cannot_be_sent_again() {
        let dispatcher = Arc::new(StubDispatcher::new());
        let service = service_with(Some(dispatcher)).await;

        let vendor = service
            .create_vendor("Acme", "sales@acme.example", "", "")
            .await
            .unwrap();
        let rfp = service.create_rfp("need 10 laptops").await.unwrap();
        service
            .send_rfp(&rfp.id, &[vendor.id.clone()])
            .await
            .unwrap();

        let err = service.send_rfp(&rfp.id, &[vendor.id]).await.unwrap_err();
        assert!(matches!(err, Error::State { .. }));
    }

    #[tokio::test]
    async fn send_requires_vendors_and_a_dispatcher() {
        let service = service_with(None).await;
        let rfp = service.create_rfp("need 10 laptops").await.unwrap();

        let err = service.send_rfp(&rfp.id, &[]).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = service
            .send_rfp(&rfp.id, &["000000000000000000000000".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn send_to_unknown_vendor_is_not_found() {
        let dispatcher = Arc::new(StubDispatcher::new());
        let service = service_with(Some(dispatcher)).await;
        let rfp = service.create_rfp("need 10 laptops").await.unwrap();

        let err = service
            .send_rfp(&rfp.id, &["000000000000000000000000".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "vendor", .. }));
    }

    #[tokio::test]
    async fn ingest_without_mailbox_is_a_transport_error() {
        let service = service_with(None).await;
        let err = service.ingest_cycle().await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn malformed_ids_are_not_found_without_a_store_lookup() {
        let dispatcher = Arc::new(StubDispatcher::new());
        let service = service_with(Some(dispatcher)).await;

        let err = service.get_rfp("not-a-hex-id").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "rfp", .. }));

        let rfp = service.create_rfp("need 10 laptops").await.unwrap();
        let err = service
            .send_rfp(&rfp.id, &["UPPERCASE-IS-INVALID-TOO".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "vendor", .. }));
    }

    #[tokio::test]
    async fn proposals_for_unknown_rfp_is_not_found() {
        let service = service_with(None).await;
        let err = service
            .list_proposals("000000000000000000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "rfp", .. }));
    }
}
