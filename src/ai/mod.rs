//! Structuring Adapter: the boundary to the text-generation service.
//!
//! `TextGenerator` is the transport seam (implemented by the Gemini
//! client, mocked in tests); `StructuringAdapter` owns prompt
//! construction and output extraction. No business logic lives here.

pub mod adapter;
pub mod gemini;

pub use adapter::{Evaluation, ProposalPayload, Recommendation, StructuringAdapter, VendorAssessment};
pub use gemini::GeminiClient;

use async_trait::async_trait;

use crate::error::Result;

/// A text-generation capability: one prompt in, raw text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
