use rusqlite::Connection;

/// Append a predicted-vs-final audit row. Fire-and-forget: a failure to log
/// must never fail the approval that triggered it, so errors are reported to
/// stderr and swallowed.
pub fn log(
    conn: &Connection,
    submission_id: Option<i64>,
    field: &str,
    predicted: Option<&str>,
    final_value: Option<&str>,
    confidence: Option<i64>,
    source: &str,
) {
    let result = conn.execute(
        "INSERT INTO corrections \
         (submission_id, field, predicted_value, final_value, confidence, source) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![submission_id, field, predicted, final_value, confidence, source],
    );
    if let Err(e) = result {
        eprintln!("warning: failed to record correction for {field}: {e}");
    }
}

pub fn count_for_submission(conn: &Connection, submission_id: i64) -> i64 {
    conn.query_row(
        "SELECT count(*) FROM corrections WHERE submission_id = ?1",
        [submission_id],
        |r| r.get(0),
    )
    .unwrap_or(0)
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

    #[test]
    fn test_log_appends() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO submissions (external_id, expense_date, amount_cents) VALUES ('z-1', '2025-03-10', 4500)",
            [],
        )
        .unwrap();
        let id = conn.last_insert_rowid();

        log(&conn, Some(id), "state", Some("TX"), Some("CA"), Some(100), "human");
        log(&conn, Some(id), "category", Some("Fuel"), Some("Travel"), Some(100), "human");
        assert_eq!(count_for_submission(&conn, id), 2);

        let (predicted, final_value, source): (String, String, String) = conn
            .query_row(
                "SELECT predicted_value, final_value, source FROM corrections WHERE field = 'state'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(predicted, "TX");
        assert_eq!(final_value, "CA");
        assert_eq!(source, "human");
    }

    #[test]
    fn test_log_failure_is_swallowed() {
        let (_dir, conn) = test_db();
        // submission 999 does not exist; the FK violation must not panic.
        log(&conn, Some(999), "state", None, Some("CA"), None, "human");
        assert_eq!(count_for_submission(&conn, 999), 0);
    }
}
