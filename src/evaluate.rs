//! Comparative evaluation of all proposals received for one RFP.
//!
//! Scores come back keyed by vendor name or email; each assessment is
//! matched to its proposal by exact string equality against either key.
//! Nothing is persisted until the model output parses, so a failed run
//! leaves scores and status untouched.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::ai::{Evaluation, ProposalPayload, StructuringAdapter};
use crate::error::{Error, Result};
use crate::rfp::model::{Proposal, Rfp, Vendor};
use crate::store::Store;

/// Raw body excerpt length fed to the evaluation prompt.
const BODY_EXCERPT_CHARS: usize = 1000;

/// Result of one evaluation run.
#[derive(Debug)]
pub struct EvaluationReport {
    pub rfp: Rfp,
    pub evaluation: Evaluation,
    /// Scored proposals, best first. Unscored proposals sort last.
    pub proposals: Vec<Proposal>,
}

/// Evaluate every proposal received for `rfp_id`, persist scores, and
/// advance the RFP to `evaluated`. Re-running on an already evaluated
/// RFP re-scores from scratch.
pub async fn evaluate_rfp(
    store: &dyn Store,
    adapter: &StructuringAdapter,
    rfp_id: &str,
) -> Result<EvaluationReport> {
    let rfp = store.get_rfp(rfp_id).await?.ok_or(Error::NotFound {
        entity: "rfp",
        id: rfp_id.to_string(),
    })?;

    // Reject the transition before spending a model call.
    let next_status = rfp.status.complete_evaluation()?;

    let proposals = store.list_proposals(rfp_id).await?;
    if proposals.is_empty() {
        return Err(Error::Validation(
            "no proposals received for this RFP".into(),
        ));
    }

    let mut vendors: HashMap<String, Vendor> = HashMap::new();
    for proposal in &proposals {
        if let Some(vendor) = store.get_vendor(&proposal.vendor_id).await? {
            vendors.insert(proposal.vendor_id.clone(), vendor);
        }
    }

    let payloads: Vec<ProposalPayload> = proposals
        .iter()
        .map(|p| ProposalPayload {
            vendor: vendor_key(vendors.get(&p.vendor_id)),
            extracted_data: p.extracted.clone(),
            raw_email_body: p.raw_email_body.chars().take(BODY_EXCERPT_CHARS).collect(),
        })
        .collect();

    let evaluation = adapter.evaluate(&rfp.structured, &payloads).await?;

    for assessment in &evaluation.comparison {
        let matched = proposals.iter().find(|p| {
            vendors
                .get(&p.vendor_id)
                .is_some_and(|v| v.name == assessment.vendor || v.email == assessment.vendor)
        });
        match matched {
            Some(proposal) => {
                store
                    .set_proposal_score(&proposal.id, assessment.score, &assessment.summary)
                    .await?;
            }
            None => {
                debug!(vendor = %assessment.vendor, "Assessment matched no proposal, skipping");
            }
        }
    }

    store.update_rfp_status(rfp_id, next_status).await?;

    let mut scored = store.list_proposals(rfp_id).await?;
    scored.sort_by(|a, b| {
        b.ai_score
            .unwrap_or(f64::MIN)
            .total_cmp(&a.ai_score.unwrap_or(f64::MIN))
    });

    let rfp = store.get_rfp(rfp_id).await?.ok_or(Error::NotFound {
        entity: "rfp",
        id: rfp_id.to_string(),
    })?;

    info!(
        rfp_id = %rfp_id,
        proposals = scored.len(),
        top_vendor = %evaluation.recommendation.top_vendor,
        "Evaluation complete"
    );
    Ok(EvaluationReport {
        rfp,
        evaluation,
        proposals: scored,
    })
}

fn vendor_key(vendor: Option<&Vendor>) -> String {
    match vendor {
        Some(v) if !v.name.is_empty() => v.name.clone(),
        Some(v) => v.email.clone(),
        None => String::new(),
    }
}
