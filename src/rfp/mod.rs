//! RFP domain model: entities and the request lifecycle.

pub mod model;
pub mod status;

pub use model::{ExtractedTerms, ItemQuote, Proposal, Rfp, RfpItem, StructuredTerms, Vendor};
pub use status::RfpStatus;
