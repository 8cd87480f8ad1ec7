use std::path::Path;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;

use crate::error::{MatchbookError, Result};
use crate::fmt::parse_amount_cents;
use crate::store;

// ---------------------------------------------------------------------------
// Report payload (the expense-system webhook body, delivered as a file)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Report {
    pub report_id: String,
    #[serde(default)]
    pub submitter: Option<String>,
    pub expenses: Vec<ReportExpense>,
}

#[derive(Debug, Deserialize)]
pub struct ReportExpense {
    pub external_id: String,
    pub date: String,
    /// Decimal string, e.g. "45.00" — kept as text so cents survive exactly.
    pub amount: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub state_tag: Option<String>,
    #[serde(default)]
    pub receipt_ref: Option<String>,
}

#[derive(Debug)]
pub struct RecordError {
    pub external_id: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct IngestResult {
    pub ingested: usize,
    pub duplicates: usize,
    pub errors: Vec<RecordError>,
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

pub fn ingest_report_file(conn: &Connection, path: &Path) -> Result<IngestResult> {
    let content = std::fs::read_to_string(path)?;
    let report: Report = serde_json::from_str(&content)
        .map_err(|e| MatchbookError::InvalidInput(format!("bad report payload: {e}")))?;
    ingest_report(conn, &report)
}

/// Ingest one expense report. Idempotent on each line item's external id:
/// redelivery of the same report is a no-op, not an error. One bad line item
/// is reported and skipped without failing the rest of the batch.
pub fn ingest_report(conn: &Connection, report: &Report) -> Result<IngestResult> {
    let mut result = IngestResult::default();

    for expense in &report.expenses {
        match validate(expense) {
            Err(message) => {
                result.errors.push(RecordError {
                    external_id: expense.external_id.clone(),
                    message,
                });
            }
            Ok(amount_cents) => {
                if store::find_submission_by_external_id(conn, &expense.external_id)?.is_some() {
                    result.duplicates += 1;
                    continue;
                }
                conn.execute(
                    "INSERT INTO submissions \
                     (external_id, report_id, expense_date, amount_cents, vendor, category, \
                      submitter, state_tag, receipt_ref) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        expense.external_id,
                        report.report_id,
                        expense.date,
                        amount_cents,
                        expense.vendor,
                        expense.category,
                        report.submitter,
                        expense.state_tag,
                        expense.receipt_ref,
                    ],
                )?;
                result.ingested += 1;
            }
        }
    }

    Ok(result)
}

fn validate(expense: &ReportExpense) -> std::result::Result<i64, String> {
    if expense.external_id.trim().is_empty() {
        return Err("missing external id".to_string());
    }
    if NaiveDate::parse_from_str(&expense.date, "%Y-%m-%d").is_err() {
        return Err(format!("unparseable date '{}'", expense.date));
    }
    let amount_cents = parse_amount_cents(&expense.amount)
        .ok_or_else(|| format!("unparseable amount '{}'", expense.amount))?;
    if amount_cents <= 0 {
        return Err(format!("amount must be positive, got '{}'", expense.amount));
    }
    Ok(amount_cents)
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

    fn expense(external_id: &str, amount: &str) -> ReportExpense {
        ReportExpense {
            external_id: external_id.to_string(),
            date: "2025-03-10".to_string(),
            amount: amount.to_string(),
            vendor: Some("Chevron".to_string()),
            category: Some("Fuel".to_string()),
            state_tag: Some("Texas - TX".to_string()),
            receipt_ref: None,
        }
    }

    fn report(expenses: Vec<ReportExpense>) -> Report {
        Report {
            report_id: "ER-100".to_string(),
            submitter: Some("jdoe".to_string()),
            expenses,
        }
    }

    #[test]
    fn test_ingest_inserts_submissions() {
        let (_dir, conn) = test_db();
        let r = report(vec![expense("z-1", "45.00"), expense("z-2", "312.88")]);
        let result = ingest_report(&conn, &r).unwrap();
        assert_eq!(result.ingested, 2);
        assert!(result.errors.is_empty());

        let sub = store::find_submission_by_external_id(&conn, "z-1").unwrap().unwrap();
        assert_eq!(sub.amount_cents, 4500);
        assert_eq!(sub.state_tag.as_deref(), Some("Texas - TX"));
        assert_eq!(sub.submitter.as_deref(), Some("jdoe"));
    }

    #[test]
    fn test_redelivery_is_noop() {
        let (_dir, conn) = test_db();
        let r = report(vec![expense("z-1", "45.00")]);
        ingest_report(&conn, &r).unwrap();
        let second = ingest_report(&conn, &r).unwrap();
        assert_eq!(second.ingested, 0);
        assert_eq!(second.duplicates, 1);
        assert!(second.errors.is_empty());

        let count: i64 = conn
            .query_row("SELECT count(*) FROM submissions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_bad_record_does_not_fail_batch() {
        let (_dir, conn) = test_db();
        let mut bad = expense("z-2", "not-money");
        bad.date = "2025-03-10".to_string();
        let r = report(vec![expense("z-1", "45.00"), bad, expense("z-3", "10.00")]);
        let result = ingest_report(&conn, &r).unwrap();
        assert_eq!(result.ingested, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].external_id, "z-2");
        assert!(result.errors[0].message.contains("unparseable amount"));
    }

    #[test]
    fn test_rejects_missing_id_bad_date_nonpositive_amount() {
        let (_dir, conn) = test_db();
        let mut no_id = expense("", "45.00");
        no_id.external_id = "  ".to_string();
        let mut bad_date = expense("z-2", "45.00");
        bad_date.date = "03/10/2025".to_string();
        let negative = expense("z-3", "-5.00");
        let r = report(vec![no_id, bad_date, negative]);
        let result = ingest_report(&conn, &r).unwrap();
        assert_eq!(result.ingested, 0);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_ingest_report_file() {
        let (dir, conn) = test_db();
        let path = dir.path().join("report.json");
        std::fs::write(
            &path,
            r#"{"report_id": "ER-7", "submitter": "kay",
                "expenses": [{"external_id": "z-9", "date": "2025-04-01", "amount": "100.00"}]}"#,
        )
        .unwrap();
        let result = ingest_report_file(&conn, &path).unwrap();
        assert_eq!(result.ingested, 1);
    }

    #[test]
    fn test_malformed_payload_is_invalid_input() {
        let (dir, conn) = test_db();
        let path = dir.path().join("report.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = ingest_report_file(&conn, &path);
        assert!(matches!(err, Err(MatchbookError::InvalidInput(_))));
    }
}
