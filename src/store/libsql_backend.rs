//! libSQL backend: async `Store` implementation.
//!
//! Local file or in-memory databases. One connection reused for all
//! operations; `libsql::Connection` is `Send + Sync` and safe for
//! concurrent async use. Per-(rfp, vendor) proposal writes are a single
//! `INSERT ... ON CONFLICT DO UPDATE` statement, so concurrent replies
//! for the same pair serialize in the store.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::rfp::model::{Proposal, Rfp, Vendor};
use crate::rfp::status::RfpStatus;
use crate::store::traits::{ProposalUpsert, Store};

const RFP_COLUMNS: &str = "id, title, raw_prompt, structured, status, created_at, updated_at";
const VENDOR_COLUMNS: &str = "id, name, email, company, notes, created_at, updated_at";
const PROPOSAL_COLUMNS: &str = "id, rfp_id, vendor_id, raw_email_body, extracted, ai_score, \
     ai_summary, received_at, created_at, updated_at";

/// libSQL store backend.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS rfps (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    raw_prompt TEXT NOT NULL,
                    structured TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'draft',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_rfps_status ON rfps(status);

                CREATE TABLE IF NOT EXISTS vendors (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    company TEXT NOT NULL DEFAULT '',
                    notes TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS rfp_recipients (
                    rfp_id TEXT NOT NULL,
                    vendor_id TEXT NOT NULL,
                    PRIMARY KEY (rfp_id, vendor_id)
                );
                CREATE INDEX IF NOT EXISTS idx_recipients_vendor ON rfp_recipients(vendor_id);

                CREATE TABLE IF NOT EXISTS proposals (
                    id TEXT PRIMARY KEY,
                    rfp_id TEXT NOT NULL,
                    vendor_id TEXT NOT NULL,
                    raw_email_body TEXT NOT NULL,
                    extracted TEXT NOT NULL,
                    ai_score REAL,
                    ai_summary TEXT NOT NULL DEFAULT '',
                    received_at TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (rfp_id, vendor_id)
                );
                CREATE INDEX IF NOT EXISTS idx_proposals_rfp ON proposals(rfp_id);",
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("init_schema: {e}")))?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Load the recipient vendor ids for one RFP.
    async fn load_recipients(&self, rfp_id: &str) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT vendor_id FROM rfp_recipients WHERE rfp_id = ?1 ORDER BY vendor_id",
                params![rfp_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_recipients: {e}")))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_recipients: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("load_recipients row: {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Map a row with `RFP_COLUMNS` to an `Rfp` (recipients filled in
    /// by the caller).
    fn row_to_rfp(row: &libsql::Row) -> Result<Rfp, DatabaseError> {
        let structured_json: String = row
            .get(3)
            .map_err(|e| DatabaseError::Query(format!("rfp row: {e}")))?;
        let structured = serde_json::from_str(&structured_json)
            .map_err(|e| DatabaseError::Serialization(format!("rfp structured terms: {e}")))?;
        let status_str: String = row
            .get(4)
            .map_err(|e| DatabaseError::Query(format!("rfp row: {e}")))?;

        Ok(Rfp {
            id: row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("rfp row: {e}")))?,
            title: row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("rfp row: {e}")))?,
            raw_prompt: row
                .get(2)
                .map_err(|e| DatabaseError::Query(format!("rfp row: {e}")))?,
            structured,
            status: RfpStatus::parse(&status_str),
            vendors_sent_to: Vec::new(),
            created_at: parse_datetime(&get_text(row, 5)?),
            updated_at: parse_datetime(&get_text(row, 6)?),
        })
    }

    fn row_to_vendor(row: &libsql::Row) -> Result<Vendor, DatabaseError> {
        Ok(Vendor {
            id: get_text(row, 0)?,
            name: get_text(row, 1)?,
            email: get_text(row, 2)?,
            company: get_text(row, 3)?,
            notes: get_text(row, 4)?,
            created_at: parse_datetime(&get_text(row, 5)?),
            updated_at: parse_datetime(&get_text(row, 6)?),
        })
    }

    fn row_to_proposal(row: &libsql::Row) -> Result<Proposal, DatabaseError> {
        let extracted_json = get_text(row, 4)?;
        let extracted = serde_json::from_str(&extracted_json)
            .map_err(|e| DatabaseError::Serialization(format!("proposal extracted terms: {e}")))?;

        Ok(Proposal {
            id: get_text(row, 0)?,
            rfp_id: get_text(row, 1)?,
            vendor_id: get_text(row, 2)?,
            raw_email_body: get_text(row, 3)?,
            extracted,
            // NULL score reads as an error from libsql; treat as unscored.
            ai_score: row.get::<f64>(5).ok(),
            ai_summary: get_text(row, 6)?,
            received_at: parse_datetime(&get_text(row, 7)?),
            created_at: parse_datetime(&get_text(row, 8)?),
            updated_at: parse_datetime(&get_text(row, 9)?),
        })
    }

    /// Run an RFP SELECT and materialize the rows with recipients.
    async fn query_rfps(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Rfp>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("query_rfps: {e}")))?;

        let mut rfps = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("query_rfps: {e}")))?
        {
            rfps.push(Self::row_to_rfp(&row)?);
        }
        for rfp in &mut rfps {
            rfp.vendors_sent_to = self.load_recipients(&rfp.id).await?;
        }
        Ok(rfps)
    }
}

fn get_text(row: &libsql::Row, idx: i32) -> Result<String, DatabaseError> {
    row.get(idx)
        .map_err(|e| DatabaseError::Query(format!("column {idx}: {e}")))
}

/// Parse an RFC 3339 datetime string (our canonical write format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Map a libsql error on a write, surfacing UNIQUE violations separately.
fn map_write_err(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

#[async_trait]
impl Store for LibSqlStore {
    // ── RFPs ────────────────────────────────────────────────────────

    async fn insert_rfp(&self, rfp: &Rfp) -> Result<(), DatabaseError> {
        let structured = serde_json::to_string(&rfp.structured)
            .map_err(|e| DatabaseError::Serialization(format!("rfp structured terms: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO rfps (id, title, raw_prompt, structured, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    rfp.id.clone(),
                    rfp.title.clone(),
                    rfp.raw_prompt.clone(),
                    structured,
                    rfp.status.as_str(),
                    rfp.created_at.to_rfc3339(),
                    rfp.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("insert_rfp", e))?;

        debug!(id = %rfp.id, "RFP inserted");
        Ok(())
    }

    async fn get_rfp(&self, id: &str) -> Result<Option<Rfp>, DatabaseError> {
        let mut rfps = self
            .query_rfps(
                &format!("SELECT {RFP_COLUMNS} FROM rfps WHERE id = ?1"),
                params![id],
            )
            .await?;
        Ok(rfps.pop())
    }

    async fn list_rfps(&self) -> Result<Vec<Rfp>, DatabaseError> {
        self.query_rfps(
            &format!("SELECT {RFP_COLUMNS} FROM rfps ORDER BY created_at DESC, id DESC"),
            (),
        )
        .await
    }

    async fn update_rfp_status(&self, id: &str, status: RfpStatus) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE rfps SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, id],
            )
            .await
            .map_err(|e| map_write_err("update_rfp_status", e))?;
        Ok(())
    }

    async fn set_rfp_recipients(
        &self,
        id: &str,
        vendor_ids: &[String],
    ) -> Result<(), DatabaseError> {
        for vendor_id in vendor_ids {
            self.conn()
                .execute(
                    "INSERT OR IGNORE INTO rfp_recipients (rfp_id, vendor_id) VALUES (?1, ?2)",
                    params![id, vendor_id.clone()],
                )
                .await
                .map_err(|e| map_write_err("set_rfp_recipients", e))?;
        }
        Ok(())
    }

    async fn open_rfps_for_vendor(&self, vendor_id: &str) -> Result<Vec<Rfp>, DatabaseError> {
        self.query_rfps(
            &format!(
                "SELECT {RFP_COLUMNS} FROM rfps
                 JOIN rfp_recipients ON rfp_recipients.rfp_id = rfps.id
                 WHERE rfp_recipients.vendor_id = ?1
                   AND rfps.status IN ('sent', 'responses_received')
                 ORDER BY rfps.created_at DESC, rfps.id DESC"
            ),
            params![vendor_id],
        )
        .await
    }

    // ── Vendors ─────────────────────────────────────────────────────

    async fn insert_vendor(&self, vendor: &Vendor) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO vendors (id, name, email, company, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    vendor.id.clone(),
                    vendor.name.clone(),
                    vendor.email.clone(),
                    vendor.company.clone(),
                    vendor.notes.clone(),
                    vendor.created_at.to_rfc3339(),
                    vendor.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("insert_vendor", e))?;

        debug!(id = %vendor.id, email = %vendor.email, "Vendor inserted");
        Ok(())
    }

    async fn get_vendor(&self, id: &str) -> Result<Option<Vendor>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_vendor: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_vendor: {e}")))?
        {
            Some(row) => Ok(Some(Self::row_to_vendor(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<Vendor>, DatabaseError> {
        let normalized = email.trim().to_lowercase();
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE email = ?1"),
                params![normalized],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_vendor_by_email: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_vendor_by_email: {e}")))?
        {
            Some(row) => Ok(Some(Self::row_to_vendor(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {VENDOR_COLUMNS} FROM vendors ORDER BY name"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_vendors: {e}")))?;

        let mut vendors = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_vendors: {e}")))?
        {
            vendors.push(Self::row_to_vendor(&row)?);
        }
        Ok(vendors)
    }

    // ── Proposals ───────────────────────────────────────────────────

    async fn upsert_proposal(&self, upsert: &ProposalUpsert) -> Result<Proposal, DatabaseError> {
        let extracted = serde_json::to_string(&upsert.extracted)
            .map_err(|e| DatabaseError::Serialization(format!("proposal extracted terms: {e}")))?;
        let now = Utc::now().to_rfc3339();
        let id = crate::id::new_object_id();

        // Single-statement upsert: the UNIQUE(rfp_id, vendor_id) index
        // serializes concurrent replies for the same pair, and the
        // received_at guard keeps a stale body from clobbering a newer one.
        self.conn()
            .execute(
                "INSERT INTO proposals (id, rfp_id, vendor_id, raw_email_body, extracted,
                    ai_score, ai_summary, received_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, '', ?6, ?7, ?7)
                 ON CONFLICT (rfp_id, vendor_id) DO UPDATE SET
                    raw_email_body = excluded.raw_email_body,
                    extracted = excluded.extracted,
                    received_at = excluded.received_at,
                    updated_at = excluded.updated_at
                 WHERE excluded.received_at >= proposals.received_at",
                params![
                    id,
                    upsert.rfp_id.clone(),
                    upsert.vendor_id.clone(),
                    upsert.raw_email_body.clone(),
                    extracted,
                    upsert.received_at.to_rfc3339(),
                    now,
                ],
            )
            .await
            .map_err(|e| map_write_err("upsert_proposal", e))?;

        // Return the stored row; on conflict the original id survives.
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROPOSAL_COLUMNS} FROM proposals
                     WHERE rfp_id = ?1 AND vendor_id = ?2"
                ),
                params![upsert.rfp_id.clone(), upsert.vendor_id.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_proposal read-back: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_proposal read-back: {e}")))?
        {
            Some(row) => Self::row_to_proposal(&row),
            None => Err(DatabaseError::Query(
                "upsert_proposal read-back: row missing after upsert".into(),
            )),
        }
    }

    async fn list_proposals(&self, rfp_id: &str) -> Result<Vec<Proposal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROPOSAL_COLUMNS} FROM proposals
                     WHERE rfp_id = ?1 ORDER BY received_at DESC, id DESC"
                ),
                params![rfp_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_proposals: {e}")))?;

        let mut proposals = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_proposals: {e}")))?
        {
            proposals.push(Self::row_to_proposal(&row)?);
        }
        Ok(proposals)
    }

    async fn set_proposal_score(
        &self,
        id: &str,
        score: f64,
        summary: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE proposals SET ai_score = ?1, ai_summary = ?2, updated_at = ?3 WHERE id = ?4",
                params![score, summary, now, id],
            )
            .await
            .map_err(|e| map_write_err("set_proposal_score", e))?;
        Ok(())
    }
}
