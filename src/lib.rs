//! AI-assisted RFP procurement service.
//!
//! Turns free-text procurement prompts into structured RFPs, dispatches
//! them to vendors by email, ingests vendor replies into proposals, and
//! runs comparative evaluation to score and rank them.

pub mod ai;
pub mod api;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod id;
pub mod ingest;
pub mod mail;
pub mod rfp;
pub mod service;
pub mod store;
