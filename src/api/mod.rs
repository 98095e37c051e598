//! HTTP surface: a JSON REST API over the application service.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::Error;
use crate::rfp::model::{Proposal, Rfp, Vendor};
use crate::service::RfpService;

type AppState = Arc<RfpService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/rfps", post(create_rfp).get(list_rfps))
        .route("/api/rfps/{id}", get(get_rfp))
        .route("/api/rfps/{id}/send", post(send_rfp))
        .route("/api/rfps/{id}/proposals", get(list_proposals))
        .route("/api/rfps/{id}/evaluate", post(evaluate_rfp))
        .route("/api/vendors", post(create_vendor).get(list_vendors))
        .route("/api/proposals/fetch-emails", post(fetch_emails))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// JSON error body with the HTTP status the error kind maps to.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) | Error::State { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.0.to_string(), "kind": self.0.kind() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ── RFPs ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateRfpRequest {
    prompt: String,
}

async fn create_rfp(
    State(service): State<AppState>,
    Json(req): Json<CreateRfpRequest>,
) -> ApiResult<(StatusCode, Json<Rfp>)> {
    let rfp = service.create_rfp(&req.prompt).await?;
    Ok((StatusCode::CREATED, Json(rfp)))
}

async fn list_rfps(State(service): State<AppState>) -> ApiResult<Json<Vec<Rfp>>> {
    Ok(Json(service.list_rfps().await?))
}

async fn get_rfp(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Rfp>> {
    Ok(Json(service.get_rfp(&id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRfpRequest {
    vendor_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRfpResponse {
    rfp: Rfp,
    outcomes: Vec<SendOutcomeBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendOutcomeBody {
    vendor_id: String,
    email: String,
    sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn send_rfp(
    State(service): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendRfpRequest>,
) -> ApiResult<Json<SendRfpResponse>> {
    let report = service.send_rfp(&id, &req.vendor_ids).await?;
    let outcomes = report
        .outcomes
        .into_iter()
        .map(|o| SendOutcomeBody {
            vendor_id: o.vendor_id,
            email: o.email,
            sent: o.result.is_ok(),
            error: o.result.err().map(|e| e.to_string()),
        })
        .collect();
    Ok(Json(SendRfpResponse {
        rfp: report.rfp,
        outcomes,
    }))
}

async fn list_proposals(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Proposal>>> {
    Ok(Json(service.list_proposals(&id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateResponse {
    rfp: Rfp,
    evaluation: crate::ai::Evaluation,
    proposals: Vec<Proposal>,
}

async fn evaluate_rfp(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EvaluateResponse>> {
    let report = service.evaluate_rfp(&id).await?;
    Ok(Json(EvaluateResponse {
        rfp: report.rfp,
        evaluation: report.evaluation,
        proposals: report.proposals,
    }))
}

// ── Vendors ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateVendorRequest {
    name: String,
    email: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    notes: String,
}

async fn create_vendor(
    State(service): State<AppState>,
    Json(req): Json<CreateVendorRequest>,
) -> ApiResult<(StatusCode, Json<Vendor>)> {
    let vendor = service
        .create_vendor(&req.name, &req.email, &req.company, &req.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(vendor)))
}

async fn list_vendors(State(service): State<AppState>) -> ApiResult<Json<Vec<Vendor>>> {
    Ok(Json(service.list_vendors().await?))
}

// ── Ingestion ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponseBody {
    processed: usize,
    succeeded: usize,
    outcomes: Vec<IngestOutcomeBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestOutcomeBody {
    sender: String,
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    proposal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn fetch_emails(State(service): State<AppState>) -> ApiResult<Json<IngestResponseBody>> {
    let outcomes = service.ingest_cycle().await?;
    let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
    let bodies = outcomes
        .into_iter()
        .map(|o| {
            let (proposal_id, error) = match o.result {
                Ok(id) => (Some(id), None),
                Err(e) => (None, Some(e.to_string())),
            };
            IngestOutcomeBody {
                sender: o.sender,
                subject: o.subject,
                proposal_id,
                error,
            }
        })
        .collect::<Vec<_>>();
    Ok(Json(IngestResponseBody {
        processed: bodies.len(),
        succeeded,
        outcomes: bodies,
    }))
}
