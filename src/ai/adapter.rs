//! Prompt construction and output extraction for the three adapter
//! capabilities: structuring an RFP, extracting proposal terms from a
//! vendor email, and comparative evaluation.
//!
//! The model is instructed to return bare JSON, but output extraction
//! tolerates markdown fences and surrounding prose.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ai::TextGenerator;
use crate::error::{Error, Result};
use crate::rfp::model::{ExtractedTerms, StructuredTerms};

/// One vendor proposal as presented to the evaluation capability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalPayload {
    /// Vendor display name or email; the evaluation response keys its
    /// scores on this exact string.
    pub vendor: String,
    pub extracted_data: ExtractedTerms,
    /// Raw body excerpt, bounded by the caller to respect input limits.
    pub raw_email_body: String,
}

/// Comparative evaluation of all proposals for one RFP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    #[serde(default)]
    pub comparison: Vec<VendorAssessment>,
    #[serde(default)]
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorAssessment {
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(default)]
    pub top_vendor: String,
    #[serde(default)]
    pub reasoning: String,
}

/// The Structuring Adapter: free text in, fixed-shape records out.
pub struct StructuringAdapter {
    generator: Arc<dyn TextGenerator>,
}

impl StructuringAdapter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Structure a natural-language procurement prompt.
    ///
    /// Fails with `Error::Extraction` when no well-formed structured
    /// payload can be recovered from the service's output.
    pub async fn structure(&self, free_text: &str) -> Result<StructuredTerms> {
        if free_text.trim().is_empty() {
            return Err(Error::Validation("prompt must not be empty".into()));
        }

        let prompt = build_structure_prompt(free_text);
        let raw = self.generator.generate(&prompt).await?;

        let json = extract_json_object(&raw)
            .ok_or_else(|| Error::Extraction("no JSON object in model output".into()))?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Extraction(format!("malformed structured terms: {e}")))
    }

    /// Extract proposal terms from a vendor email body.
    ///
    /// Never raises for unusable output: degrades to the all-empty shape
    /// so the raw body can still be stored for later re-extraction.
    pub async fn extract_proposal(&self, email_body: &str) -> ExtractedTerms {
        let prompt = build_extract_prompt(email_body);

        let raw = match self.generator.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Proposal extraction call failed, storing empty terms");
                return ExtractedTerms::default();
            }
        };

        let Some(json) = extract_json_object(&raw) else {
            warn!("No JSON object in extraction output, storing empty terms");
            return ExtractedTerms::default();
        };

        serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!(error = %e, "Malformed extraction output, storing empty terms");
            ExtractedTerms::default()
        })
    }

    /// Evaluate and compare proposals against the RFP terms.
    ///
    /// Fails with `Error::Evaluation` on malformed output.
    pub async fn evaluate(
        &self,
        rfp_terms: &StructuredTerms,
        proposals: &[ProposalPayload],
    ) -> Result<Evaluation> {
        let prompt = build_evaluate_prompt(rfp_terms, proposals)?;
        let raw = self.generator.generate(&prompt).await?;

        let json = extract_json_object(&raw)
            .ok_or_else(|| Error::Evaluation("no JSON object in model output".into()))?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Evaluation(format!("malformed evaluation: {e}")))
    }
}

fn build_structure_prompt(free_text: &str) -> String {
    format!(
        r#"You are an expert procurement analyst. Parse the following natural language procurement request into a structured JSON format.

Input: {free_text}

Extract and structure the following information:
1. items: Array of objects with {{name, quantity, specs}}
2. budget: Budget range or amount mentioned
3. deliveryTimeline: Expected delivery timeline
4. paymentTerms: Payment terms mentioned
5. warranty: Warranty requirements

Return ONLY valid JSON in this exact format (no markdown, no code blocks, no explanations):
{{
  "items": [{{"name": "string", "quantity": number, "specs": "string"}}],
  "budget": "string",
  "deliveryTimeline": "string",
  "paymentTerms": "string",
  "warranty": "string"
}}

If any field is not mentioned, use an empty string or empty array."#
    )
}

fn build_extract_prompt(email_body: &str) -> String {
    format!(
        r#"You are an expert at extracting proposal information from vendor emails. Parse the following vendor email response into structured data.

Email Body:
{email_body}

Extract the following information:
1. totalPrice: Total price quoted (as string, preserve currency symbols)
2. itemBreakdown: Array of {{itemName, quantity, unitPrice, totalPrice, notes}}
3. deliveryTimeline: Delivery timeline mentioned
4. paymentTerms: Payment terms
5. warranty: Warranty information
6. exceptions: Any exceptions, conditions, or special notes

Return ONLY valid JSON in this exact format (no markdown, no code blocks):
{{
  "totalPrice": "string",
  "itemBreakdown": [{{"itemName": "string", "quantity": number, "unitPrice": number, "totalPrice": number, "notes": "string"}}],
  "deliveryTimeline": "string",
  "paymentTerms": "string",
  "warranty": "string",
  "exceptions": "string"
}}

If any field is not mentioned, use an empty string or empty array."#
    )
}

fn build_evaluate_prompt(
    rfp_terms: &StructuredTerms,
    proposals: &[ProposalPayload],
) -> Result<String> {
    let rfp_json = serde_json::to_string_pretty(rfp_terms)
        .map_err(|e| Error::Evaluation(format!("failed to serialize RFP terms: {e}")))?;
    let proposals_json = serde_json::to_string_pretty(proposals)
        .map_err(|e| Error::Evaluation(format!("failed to serialize proposals: {e}")))?;

    Ok(format!(
        r#"You are an expert procurement evaluator. Evaluate and compare vendor proposals against the RFP requirements.

RFP Requirements:
{rfp_json}

Vendor Proposals:
{proposals_json}

For each vendor proposal, provide:
1. A score from 0-100 based on:
   - Price competitiveness
   - Alignment with requirements
   - Delivery timeline feasibility
   - Payment terms acceptability
   - Warranty coverage
   - Overall professionalism

2. A brief summary of strengths and weaknesses

3. A clear recommendation ranking vendors from best to worst

Return ONLY valid JSON in this exact format (no markdown, no code blocks):
{{
  "comparison": [
    {{
      "vendor": "vendor name/email",
      "score": number (0-100),
      "summary": "string",
      "strengths": ["string"],
      "weaknesses": ["string"]
    }}
  ],
  "recommendation": {{
    "topVendor": "vendor name/email",
    "reasoning": "string explaining why this vendor is recommended"
  }}
}}"#
    ))
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner.to_string());
            }
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner.to_string());
            }
        }
    }

    // Outermost object bounds in surrounding prose.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return Some(trimmed[start..=end].to_string());
    }

    None
}
