//! End-to-end flow: create vendors, create an RFP from free text,
//! dispatch it, ingest vendor replies, evaluate, and rank.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use rfp_assist::ai::{StructuringAdapter, TextGenerator};
use rfp_assist::error::Result;
use rfp_assist::mail::{Dispatcher, InboundEmail, Mailbox};
use rfp_assist::rfp::status::RfpStatus;
use rfp_assist::service::RfpService;
use rfp_assist::store::LibSqlStore;

/// Routes canned responses by recognizing which prompt is being asked.
struct ScriptedGenerator;

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.contains("procurement analyst") {
            return Ok(r#"{
                "items": [{"name": "laptop", "quantity": 10, "specs": "16GB RAM"}],
                "budget": "$20,000",
                "deliveryTimeline": "4 weeks",
                "paymentTerms": "net 30",
                "warranty": "1 year"
            }"#
            .to_string());
        }
        if prompt.contains("procurement evaluator") {
            return Ok(r#"{
                "comparison": [
                    {"vendor": "Acme", "score": 71, "summary": "pricier but fast",
                     "strengths": ["delivery"], "weaknesses": ["price"]},
                    {"vendor": "Globex", "score": 89, "summary": "best value",
                     "strengths": ["price", "warranty"], "weaknesses": []}
                ],
                "recommendation": {"topVendor": "Globex", "reasoning": "lowest total cost"}
            }"#
            .to_string());
        }
        // Proposal extraction.
        Ok(r#"{
            "totalPrice": "$9,500",
            "itemBreakdown": [{"itemName": "laptop", "quantity": 10,
                               "unitPrice": 950.0, "totalPrice": 9500.0, "notes": ""}],
            "deliveryTimeline": "2 weeks",
            "paymentTerms": "net 30",
            "warranty": "1 year",
            "exceptions": ""
        }"#
        .to_string())
    }
}

/// Records outbound sends.
struct RecordingDispatcher {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Serves a configurable batch of unread emails.
struct QueueMailbox {
    emails: Mutex<Vec<InboundEmail>>,
}

#[async_trait]
impl Mailbox for QueueMailbox {
    async fn fetch_unread(&self) -> Result<Vec<InboundEmail>> {
        Ok(std::mem::take(&mut *self.emails.lock().unwrap()))
    }
}

fn reply(sender: &str, subject: &str, body: &str) -> InboundEmail {
    InboundEmail {
        sender: sender.to_string(),
        subject: subject.to_string(),
        in_reply_to: None,
        references: Vec::new(),
        body_text: body.to_string(),
        date: Utc::now(),
    }
}

#[tokio::test]
async fn full_procurement_flow_from_prompt_to_ranking() {
    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let adapter = Arc::new(StructuringAdapter::new(Arc::new(ScriptedGenerator)));
    let dispatcher = Arc::new(RecordingDispatcher {
        sent: Mutex::new(Vec::new()),
    });
    let mailbox = Arc::new(QueueMailbox {
        emails: Mutex::new(Vec::new()),
    });
    let service = RfpService::new(
        store,
        adapter,
        Some(mailbox.clone()),
        Some(dispatcher.clone()),
    );

    // Vendors first.
    let acme = service
        .create_vendor("Acme", "sales@acme.example", "Acme Corp", "")
        .await
        .unwrap();
    let globex = service
        .create_vendor("Globex", "quotes@globex.example", "Globex Inc", "")
        .await
        .unwrap();

    // Free text becomes a structured draft.
    let rfp = service
        .create_rfp("need 10 laptops with 16GB RAM, budget $20k, delivery in 4 weeks")
        .await
        .unwrap();
    assert_eq!(rfp.status, RfpStatus::Draft);
    assert_eq!(rfp.structured.items[0].quantity, 10);

    // Dispatch to both vendors.
    let report = service
        .send_rfp(&rfp.id, &[acme.id.clone(), globex.id.clone()])
        .await
        .unwrap();
    assert_eq!(report.rfp.status, RfpStatus::Sent);
    assert_eq!(report.rfp.vendors_sent_to.len(), 2);

    let subjects: Vec<String> = dispatcher
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|(_, s)| s.clone())
        .collect();
    assert_eq!(subjects.len(), 2);
    assert!(subjects.iter().all(|s| s.contains(&format!("[Ref: {}]", rfp.id))));

    // Both vendors reply; one by subject tag, one relying on recency.
    {
        let mut queue = mailbox.emails.lock().unwrap();
        queue.push(reply(
            "sales@acme.example",
            &format!("Re: RFP: need 10 laptops [Ref: {}]", rfp.id),
            "We quote $11,000 total, delivery in 1 week.",
        ));
        queue.push(reply(
            "quotes@globex.example",
            "Our quotation for your laptop request",
            "We quote $9,500 total, delivery in 2 weeks.",
        ));
    }

    let outcomes = service.ingest_cycle().await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.result.is_ok()));

    let proposals = service.list_proposals(&rfp.id).await.unwrap();
    assert_eq!(proposals.len(), 2);
    assert!(proposals.iter().all(|p| p.ai_score.is_none()));
    assert_eq!(
        service.get_rfp(&rfp.id).await.unwrap().status,
        RfpStatus::ResponsesReceived
    );

    // A second cycle with nothing queued changes nothing.
    let outcomes = service.ingest_cycle().await.unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(service.list_proposals(&rfp.id).await.unwrap().len(), 2);

    // Evaluate and rank.
    let evaluation = service.evaluate_rfp(&rfp.id).await.unwrap();
    assert_eq!(evaluation.rfp.status, RfpStatus::Evaluated);
    assert_eq!(evaluation.evaluation.recommendation.top_vendor, "Globex");

    assert_eq!(evaluation.proposals.len(), 2);
    assert_eq!(evaluation.proposals[0].vendor_id, globex.id);
    assert_eq!(evaluation.proposals[0].ai_score, Some(89.0));
    assert_eq!(evaluation.proposals[1].vendor_id, acme.id);
    assert_eq!(evaluation.proposals[1].ai_score, Some(71.0));
    assert_eq!(evaluation.proposals[1].ai_summary, "pricier but fast");
}

#[tokio::test]
async fn late_duplicate_reply_updates_rather_than_duplicates() {
    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let adapter = Arc::new(StructuringAdapter::new(Arc::new(ScriptedGenerator)));
    let dispatcher = Arc::new(RecordingDispatcher {
        sent: Mutex::new(Vec::new()),
    });
    let mailbox = Arc::new(QueueMailbox {
        emails: Mutex::new(Vec::new()),
    });
    let service = RfpService::new(
        store,
        adapter,
        Some(mailbox.clone()),
        Some(dispatcher),
    );

    let acme = service
        .create_vendor("Acme", "sales@acme.example", "", "")
        .await
        .unwrap();
    let rfp = service.create_rfp("need 10 laptops").await.unwrap();
    service.send_rfp(&rfp.id, &[acme.id.clone()]).await.unwrap();

    let subject = format!("Re: [Ref: {}]", rfp.id);
    mailbox
        .emails
        .lock()
        .unwrap()
        .push(reply("sales@acme.example", &subject, "First offer: $12,000"));
    service.ingest_cycle().await.unwrap();

    // A corrected offer arrives later from the same vendor.
    mailbox
        .emails
        .lock()
        .unwrap()
        .push(reply("sales@acme.example", &subject, "Revised offer: $9,500"));
    service.ingest_cycle().await.unwrap();

    let proposals = service.list_proposals(&rfp.id).await.unwrap();
    assert_eq!(proposals.len(), 1);
    assert!(proposals[0].raw_email_body.contains("Revised offer"));
}
