//! Request lifecycle state machine.
//!
//! `draft → sent → responses_received → evaluated`, forward-only.
//! Illegal transitions are surfaced as `Error::State`, never silently
//! corrected.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle status of an RFP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfpStatus {
    Draft,
    Sent,
    ResponsesReceived,
    Evaluated,
}

impl RfpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RfpStatus::Draft => "draft",
            RfpStatus::Sent => "sent",
            RfpStatus::ResponsesReceived => "responses_received",
            RfpStatus::Evaluated => "evaluated",
        }
    }

    /// Parse a status string from the store. Unknown values fall back to
    /// `draft`, matching how the store treats unrecognized rows.
    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => RfpStatus::Sent,
            "responses_received" => RfpStatus::ResponsesReceived,
            "evaluated" => RfpStatus::Evaluated,
            _ => RfpStatus::Draft,
        }
    }

    /// Transition for dispatching the RFP to vendors.
    /// Only a `draft` request can be dispatched.
    pub fn dispatch(self) -> Result<RfpStatus> {
        match self {
            RfpStatus::Draft => Ok(RfpStatus::Sent),
            from => Err(Error::State {
                operation: "dispatch",
                from,
                to: RfpStatus::Sent,
            }),
        }
    }

    /// Transition for the first successful proposal ingestion.
    ///
    /// Idempotent: requests already past `sent` stay where they are.
    /// Ingesting against a request that was never sent is a logic error.
    pub fn receive_response(self) -> Result<RfpStatus> {
        match self {
            RfpStatus::Sent => Ok(RfpStatus::ResponsesReceived),
            RfpStatus::ResponsesReceived | RfpStatus::Evaluated => Ok(self),
            RfpStatus::Draft => Err(Error::State {
                operation: "ingest",
                from: RfpStatus::Draft,
                to: RfpStatus::ResponsesReceived,
            }),
        }
    }

    /// Transition for a successful evaluation run. Re-entrant from
    /// `evaluated` so a request can be re-scored.
    pub fn complete_evaluation(self) -> Result<RfpStatus> {
        match self {
            RfpStatus::ResponsesReceived | RfpStatus::Evaluated => Ok(RfpStatus::Evaluated),
            from => Err(Error::State {
                operation: "evaluate",
                from,
                to: RfpStatus::Evaluated,
            }),
        }
    }
}

impl std::fmt::Display for RfpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
