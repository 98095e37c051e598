//! Inbound email ingestion: correlate replies to RFPs, extract terms,
//! and upsert proposals.

pub mod correlation;
pub mod pipeline;

pub use pipeline::{IngestOutcome, run_cycle};
