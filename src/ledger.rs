use std::io::Write;
use std::path::PathBuf;

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{MatchbookError, Result};

// ---------------------------------------------------------------------------
// Post requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    Purchase,
    Bill,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Bill => "bill",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostRequest {
    pub kind: String,
    pub amount_cents: i64,
    pub vendor: String,
    pub category: Option<String>,
    pub state: String,
    pub date: String,
    /// Reimbursement method for bill postings.
    pub method: Option<String>,
    pub idempotency_key: String,
}

impl PostRequest {
    pub fn new(
        kind: PostKind,
        amount_cents: i64,
        vendor: &str,
        category: Option<&str>,
        state: &str,
        date: &str,
    ) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            amount_cents,
            vendor: vendor.to_string(),
            category: category.map(|c| c.to_string()),
            state: state.to_string(),
            date: date.to_string(),
            method: None,
            idempotency_key: String::new(),
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }
}

/// Stable retry key: the same source posted as the same kind always produces
/// the same key, so a retried call cannot double-post.
pub fn idempotency_key(kind: PostKind, source_kind: &str, source_id: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{source_kind}:{source_id}", kind.as_str()));
    hex::encode(hasher.finalize())[..32].to_string()
}

// ---------------------------------------------------------------------------
// Poster boundary
// ---------------------------------------------------------------------------

/// The accounting system's transaction-creation endpoint. Implementations
/// must treat a call as possibly slow and possibly failing, and must bound
/// it: an outcome that cannot be confirmed is an error, never a success.
pub trait LedgerPoster {
    fn post(&self, request: &PostRequest) -> Result<String>;
}

/// At-most-once posting. A key already in the postings table short-circuits
/// to the recorded id without touching the poster, so review actions and
/// matcher retries can re-run safely.
pub fn post_once(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    kind: PostKind,
    source_kind: &str,
    source_id: i64,
    mut request: PostRequest,
) -> Result<String> {
    let key = idempotency_key(kind, source_kind, source_id);
    let existing: Option<String> = conn
        .query_row(
            "SELECT posted_id FROM postings WHERE idempotency_key = ?1",
            [&key],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(posted_id) = existing {
        return Ok(posted_id);
    }

    request.idempotency_key = key.clone();
    let posted_id = poster.post(&request)?;
    conn.execute(
        "INSERT INTO postings (idempotency_key, kind, posted_id, amount_cents, vendor) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![key, kind.as_str(), posted_id, request.amount_cents, request.vendor],
    )?;
    Ok(posted_id)
}

// ---------------------------------------------------------------------------
// Outbox implementation
// ---------------------------------------------------------------------------

/// Hands accepted posts to the accounting system as JSON lines in an outbox
/// file. The posted id is derived from the idempotency key, so replays of the
/// same request produce the same id.
pub struct OutboxLedger {
    path: PathBuf,
}

impl OutboxLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl LedgerPoster for OutboxLedger {
    fn post(&self, request: &PostRequest) -> Result<String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(request)
            .map_err(|e| MatchbookError::Ledger(format!("serialize post: {e}")))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MatchbookError::Ledger(format!("open outbox: {e}")))?;
        writeln!(file, "{line}").map_err(|e| MatchbookError::Ledger(format!("write outbox: {e}")))?;
        Ok(format!("L-{}", &request.idempotency_key[..12]))
    }
}

// ---------------------------------------------------------------------------
// Posted-vs-marked reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct AuditReport {
    /// Sources whose status claims a ledger post that was never recorded.
    pub marked_not_posted: Vec<String>,
    /// Recorded posts no source row references — a crash landed between the
    /// ledger call and the status update.
    pub posted_not_marked: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.marked_not_posted.is_empty() && self.posted_not_marked.is_empty()
    }
}

pub fn audit(conn: &Connection) -> Result<AuditReport> {
    let mut report = AuditReport::default();

    let mut stmt = conn.prepare(
        "SELECT id, status FROM submissions \
         WHERE status IN ('posted', 'corrected') AND ledger_post_id IS NULL",
    )?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
    for row in rows {
        let (id, status) = row?;
        report
            .marked_not_posted
            .push(format!("submission {id} is {status} with no ledger post"));
    }

    let mut stmt = conn.prepare(
        "SELECT id FROM bank_transactions WHERE status = 'orphan_processed' AND ledger_post_id IS NULL",
    )?;
    let rows = stmt.query_map([], |r| r.get::<_, i64>(0))?;
    for row in rows {
        report.marked_not_posted.push(format!(
            "transaction {} is orphan_processed with no ledger post",
            row?
        ));
    }

    let mut stmt = conn.prepare(
        "SELECT posted_id FROM postings p \
         WHERE NOT EXISTS (SELECT 1 FROM submissions s WHERE s.ledger_post_id = p.posted_id) \
           AND NOT EXISTS (SELECT 1 FROM bank_transactions t WHERE t.ledger_post_id = p.posted_id)",
    )?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    for row in rows {
        report
            .posted_not_marked
            .push(format!("posting {} has no marked source", row?));
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::db::{get_connection, init_db};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn request() -> PostRequest {
        PostRequest::new(PostKind::Purchase, 4500, "Chevron", Some("Fuel"), "TX", "2025-03-10")
    }

    #[test]
    fn test_idempotency_key_is_stable() {
        let a = idempotency_key(PostKind::Purchase, "submission", 42);
        let b = idempotency_key(PostKind::Purchase, "submission", 42);
        let c = idempotency_key(PostKind::Bill, "submission", 42);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_post_once_posts_exactly_once() {
        let (_dir, conn) = test_db();
        let ledger = RecordingLedger::default();

        let first =
            post_once(&conn, &ledger, PostKind::Purchase, "submission", 1, request()).unwrap();
        let second =
            post_once(&conn, &ledger, PostKind::Purchase, "submission", 1, request()).unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.posts.borrow().len(), 1);
    }

    #[test]
    fn test_post_once_failure_records_nothing() {
        let (_dir, conn) = test_db();
        let result = post_once(&conn, &FailingLedger, PostKind::Purchase, "submission", 1, request());
        assert!(result.is_err());
        let count: i64 = conn
            .query_row("SELECT count(*) FROM postings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_outbox_ledger_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let ledger = OutboxLedger::new(path.clone());

        let mut req = request();
        req.idempotency_key = "abcdef0123456789".to_string();
        let posted_id = ledger.post(&req).unwrap();
        assert_eq!(posted_id, "L-abcdef012345");

        let content = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(line["kind"], "purchase");
        assert_eq!(line["amount_cents"], 4500);
        assert_eq!(line["state"], "TX");
    }

    #[test]
    fn test_audit_flags_marked_not_posted() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO submissions (external_id, expense_date, amount_cents, status) \
             VALUES ('z-1', '2025-03-10', 4500, 'posted')",
            [],
        )
        .unwrap();
        let report = audit(&conn).unwrap();
        assert_eq!(report.marked_not_posted.len(), 1);
        assert!(report.posted_not_marked.is_empty());
    }

    #[test]
    fn test_audit_flags_posted_not_marked() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO postings (idempotency_key, kind, posted_id, amount_cents) \
             VALUES ('k1', 'purchase', 'L-1', 4500)",
            [],
        )
        .unwrap();
        let report = audit(&conn).unwrap();
        assert_eq!(report.posted_not_marked.len(), 1);
    }

    #[test]
    fn test_audit_clean_when_consistent() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO submissions (external_id, expense_date, amount_cents, status, ledger_post_id) \
             VALUES ('z-1', '2025-03-10', 4500, 'posted', 'L-1')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO postings (idempotency_key, kind, posted_id, amount_cents) \
             VALUES ('k1', 'purchase', 'L-1', 4500)",
            [],
        )
        .unwrap();
        let report = audit(&conn).unwrap();
        assert!(report.is_clean());
    }
}
