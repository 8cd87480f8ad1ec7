use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bank_transactions (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL,
    transaction_date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    extracted_vendor TEXT,
    status TEXT NOT NULL DEFAULT 'unmatched',
    matched_submission_id INTEGER,
    matched_by TEXT,
    match_confidence INTEGER,
    orphan_category TEXT,
    orphan_state TEXT,
    ledger_post_id TEXT,
    import_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT,
    FOREIGN KEY (matched_submission_id) REFERENCES submissions(id),
    FOREIGN KEY (import_id) REFERENCES imports(id)
);

CREATE INDEX IF NOT EXISTS idx_bank_txn_status_date
    ON bank_transactions(status, transaction_date);

CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    report_id TEXT,
    expense_date TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    original_amount_cents INTEGER,
    original_expense_date TEXT,
    vendor TEXT,
    category TEXT,
    submitter TEXT,
    state_tag TEXT,
    receipt_ref TEXT,
    receipt_amount_cents INTEGER,
    receipt_confidence INTEGER,
    status TEXT NOT NULL DEFAULT 'pending',
    flag_kind TEXT,
    flag_reason TEXT,
    suggested_transaction_id INTEGER,
    suggested_state TEXT,
    suggested_state_source TEXT,
    match_confidence INTEGER,
    state TEXT,
    ledger_post_id TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT,
    posted_at TEXT,
    FOREIGN KEY (suggested_transaction_id) REFERENCES bank_transactions(id)
);

CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status);

CREATE TABLE IF NOT EXISTS vendor_rules (
    id INTEGER PRIMARY KEY,
    pattern TEXT NOT NULL UNIQUE,
    match_type TEXT NOT NULL DEFAULT 'contains',
    category TEXT,
    state TEXT,
    confidence INTEGER NOT NULL DEFAULT 70,
    priority INTEGER NOT NULL DEFAULT 0,
    hit_count INTEGER NOT NULL DEFAULT 0,
    last_matched_at TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    state TEXT NOT NULL,
    starts_on TEXT NOT NULL,
    ends_on TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS corrections (
    id INTEGER PRIMARY KEY,
    submission_id INTEGER,
    field TEXT NOT NULL,
    predicted_value TEXT,
    final_value TEXT,
    confidence INTEGER,
    source TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (submission_id) REFERENCES submissions(id)
);

CREATE TABLE IF NOT EXISTS processing_errors (
    id INTEGER PRIMARY KEY,
    source_kind TEXT NOT NULL,
    source_id INTEGER NOT NULL,
    stage TEXT NOT NULL,
    message TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'new',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS postings (
    idempotency_key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    posted_id TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    vendor TEXT,
    posted_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    source TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    record_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "bank_transactions",
            "submissions",
            "vendor_rules",
            "events",
            "corrections",
            "processing_errors",
            "postings",
            "imports",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_duplicate_external_id_rejected_by_schema() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO submissions (external_id, expense_date, amount_cents) VALUES ('z-1', '2025-01-15', 5000)",
            [],
        )
        .unwrap();
        let err = conn.execute(
            "INSERT INTO submissions (external_id, expense_date, amount_cents) VALUES ('z-1', '2025-01-15', 5000)",
            [],
        );
        assert!(err.is_err());
    }
}
