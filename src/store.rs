use chrono::{Duration, NaiveDate};
use rusqlite::{Connection, OptionalExtension};

use crate::error::{MatchbookError, Result};
use crate::models::{BankTransaction, Submission, TxnStatus};
use crate::policy::MatchTolerances;

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub fn get_transaction(conn: &Connection, id: i64) -> Result<BankTransaction> {
    let sql = format!(
        "SELECT {} FROM bank_transactions WHERE id = ?1",
        BankTransaction::COLUMNS
    );
    conn.query_row(&sql, [id], BankTransaction::from_row)
        .optional()?
        .ok_or(MatchbookError::UnknownTransaction(id))
}

pub fn get_submission(conn: &Connection, id: i64) -> Result<Submission> {
    let sql = format!("SELECT {} FROM submissions WHERE id = ?1", Submission::COLUMNS);
    conn.query_row(&sql, [id], Submission::from_row)
        .optional()?
        .ok_or(MatchbookError::UnknownSubmission(id))
}

pub fn find_submission_by_external_id(
    conn: &Connection,
    external_id: &str,
) -> Result<Option<Submission>> {
    let sql = format!(
        "SELECT {} FROM submissions WHERE external_id = ?1",
        Submission::COLUMNS
    );
    Ok(conn
        .query_row(&sql, [external_id], Submission::from_row)
        .optional()?)
}

pub fn transactions_by_status(conn: &Connection, status: TxnStatus) -> Result<Vec<BankTransaction>> {
    let sql = format!(
        "SELECT {} FROM bank_transactions WHERE status = ?1 ORDER BY transaction_date",
        BankTransaction::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([status.as_str()], BankTransaction::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn pending_submissions(conn: &Connection) -> Result<Vec<Submission>> {
    let sql = format!(
        "SELECT {} FROM submissions WHERE status = 'pending' ORDER BY id",
        Submission::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], Submission::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Unmatched transactions within the amount and date tolerances of a target.
pub fn candidate_window(
    conn: &Connection,
    amount_cents: i64,
    date: NaiveDate,
    tolerances: &MatchTolerances,
) -> Result<Vec<BankTransaction>> {
    let start = (date - Duration::days(tolerances.date_tolerance_days)).to_string();
    let end = (date + Duration::days(tolerances.date_tolerance_days)).to_string();
    let sql = format!(
        "SELECT {} FROM bank_transactions \
         WHERE status = 'unmatched' \
           AND transaction_date BETWEEN ?1 AND ?2 \
           AND abs(amount_cents - ?3) <= ?4 \
         ORDER BY transaction_date",
        BankTransaction::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params![start, end, amount_cents, tolerances.amount_tolerance_cents],
            BankTransaction::from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Unmatched transactions in a date window regardless of amount. Used by the
/// gratuity fallback, which matches on a ratio rather than a tolerance.
pub fn unmatched_in_date_window(
    conn: &Connection,
    date: NaiveDate,
    tolerance_days: i64,
) -> Result<Vec<BankTransaction>> {
    let start = (date - Duration::days(tolerance_days)).to_string();
    let end = (date + Duration::days(tolerance_days)).to_string();
    let sql = format!(
        "SELECT {} FROM bank_transactions \
         WHERE status = 'unmatched' AND transaction_date BETWEEN ?1 AND ?2 \
         ORDER BY transaction_date",
        BankTransaction::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([start, end], BankTransaction::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Idempotent appends
// ---------------------------------------------------------------------------

/// Insert a bank transaction unless an identical row already exists.
/// Returns the new row id, or None when the row was a duplicate.
pub fn insert_transaction(
    conn: &Connection,
    source: &str,
    date: &str,
    description: &str,
    amount_cents: i64,
    extracted_vendor: Option<&str>,
    import_id: Option<i64>,
) -> Result<Option<i64>> {
    let exists: bool = conn
        .prepare_cached(
            "SELECT 1 FROM bank_transactions \
             WHERE source = ?1 AND transaction_date = ?2 AND amount_cents = ?3 AND description = ?4",
        )?
        .exists(rusqlite::params![source, date, amount_cents, description])?;
    if exists {
        return Ok(None);
    }
    conn.execute(
        "INSERT INTO bank_transactions \
         (source, transaction_date, description, amount_cents, extracted_vendor, import_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![source, date, description, amount_cents, extracted_vendor, import_id],
    )?;
    Ok(Some(conn.last_insert_rowid()))
}

// ---------------------------------------------------------------------------
// Compare-and-set status transitions
// ---------------------------------------------------------------------------

/// Claim an unmatched transaction for a submission. Returns false when the
/// transaction was no longer unmatched, in which case nothing was written.
pub fn claim_transaction(
    conn: &Connection,
    txn_id: i64,
    submission_id: i64,
    matched_by: &str,
    confidence: i64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE bank_transactions \
         SET status = 'matched', matched_submission_id = ?2, matched_by = ?3, \
             match_confidence = ?4, updated_at = datetime('now') \
         WHERE id = ?1 AND status = 'unmatched'",
        rusqlite::params![txn_id, submission_id, matched_by, confidence],
    )?;
    Ok(updated == 1)
}

/// Claim an unmatched transaction for orphan processing.
pub fn claim_orphan(
    conn: &Connection,
    txn_id: i64,
    category: &str,
    state: &str,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE bank_transactions \
         SET status = 'orphan_processed', matched_by = 'sweep', orphan_category = ?2, \
             orphan_state = ?3, updated_at = datetime('now') \
         WHERE id = ?1 AND status = 'unmatched'",
        rusqlite::params![txn_id, category, state],
    )?;
    Ok(updated == 1)
}

/// Compensation for a failed ledger post: return a claimed transaction to the
/// unmatched pool.
pub fn release_transaction(conn: &Connection, txn_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE bank_transactions \
         SET status = 'unmatched', matched_submission_id = NULL, matched_by = NULL, \
             match_confidence = NULL, orphan_category = NULL, orphan_state = NULL, \
             updated_at = datetime('now') \
         WHERE id = ?1 AND status IN ('matched', 'orphan_processed') AND ledger_post_id IS NULL",
        [txn_id],
    )?;
    Ok(())
}

pub fn record_transaction_post(conn: &Connection, txn_id: i64, posted_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE bank_transactions SET ledger_post_id = ?2, updated_at = datetime('now') WHERE id = ?1",
        rusqlite::params![txn_id, posted_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn add_txn(conn: &Connection, date: &str, amount_cents: i64) -> i64 {
        insert_transaction(conn, "amex", date, &format!("TXN {date} {amount_cents}"), amount_cents, None, None)
            .unwrap()
            .unwrap()
    }

    fn add_submission(conn: &Connection, external_id: &str) -> i64 {
        conn.execute(
            "INSERT INTO submissions (external_id, expense_date, amount_cents) VALUES (?1, '2025-03-10', 10000)",
            [external_id],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_insert_transaction_dedupes() {
        let (_dir, conn) = test_db();
        let first = insert_transaction(&conn, "amex", "2025-03-10", "CHEVRON 123", -4500, None, None).unwrap();
        assert!(first.is_some());
        let second = insert_transaction(&conn, "amex", "2025-03-10", "CHEVRON 123", -4500, None, None).unwrap();
        assert!(second.is_none());
        let count: i64 = conn
            .query_row("SELECT count(*) FROM bank_transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_candidate_window_filters_amount_and_date() {
        let (_dir, conn) = test_db();
        add_txn(&conn, "2025-03-10", 10000); // exact
        add_txn(&conn, "2025-03-12", 10080); // within $1, within 3 days
        add_txn(&conn, "2025-03-20", 10000); // too far in time
        add_txn(&conn, "2025-03-10", 10200); // too far in amount

        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let candidates =
            candidate_window(&conn, 10000, date, &MatchTolerances::default()).unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_candidate_window_excludes_matched() {
        let (_dir, conn) = test_db();
        let txn = add_txn(&conn, "2025-03-10", 10000);
        let sub = add_submission(&conn, "z-1");
        assert!(claim_transaction(&conn, txn, sub, "matcher", 100).unwrap());

        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let candidates =
            candidate_window(&conn, 10000, date, &MatchTolerances::default()).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_claim_is_compare_and_set() {
        let (_dir, conn) = test_db();
        let txn = add_txn(&conn, "2025-03-10", 10000);
        let sub_a = add_submission(&conn, "z-1");
        let sub_b = add_submission(&conn, "z-2");

        assert!(claim_transaction(&conn, txn, sub_a, "matcher", 100).unwrap());
        // Second claimant loses: the row is no longer unmatched.
        assert!(!claim_transaction(&conn, txn, sub_b, "matcher", 100).unwrap());

        let t = get_transaction(&conn, txn).unwrap();
        assert_eq!(t.matched_submission_id, Some(sub_a));
    }

    #[test]
    fn test_release_reverts_claim() {
        let (_dir, conn) = test_db();
        let txn = add_txn(&conn, "2025-03-10", 10000);
        let sub = add_submission(&conn, "z-1");
        claim_transaction(&conn, txn, sub, "matcher", 100).unwrap();
        release_transaction(&conn, txn).unwrap();

        let t = get_transaction(&conn, txn).unwrap();
        assert_eq!(t.status, TxnStatus::Unmatched);
        assert_eq!(t.matched_submission_id, None);
    }

    #[test]
    fn test_release_keeps_posted_claims() {
        let (_dir, conn) = test_db();
        let txn = add_txn(&conn, "2025-03-10", 10000);
        let sub = add_submission(&conn, "z-1");
        claim_transaction(&conn, txn, sub, "matcher", 100).unwrap();
        record_transaction_post(&conn, txn, "L-77").unwrap();
        release_transaction(&conn, txn).unwrap();

        // Already posted to the ledger: the claim must not be undone.
        let t = get_transaction(&conn, txn).unwrap();
        assert_eq!(t.status, TxnStatus::Matched);
        assert_eq!(t.ledger_post_id.as_deref(), Some("L-77"));
    }

    #[test]
    fn test_get_missing_rows_error() {
        let (_dir, conn) = test_db();
        assert!(get_transaction(&conn, 99).is_err());
        assert!(get_submission(&conn, 99).is_err());
        assert!(find_submission_by_external_id(&conn, "nope").unwrap().is_none());
    }
}
