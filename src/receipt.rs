use rusqlite::Connection;

use crate::corrections;
use crate::error::{MatchbookError, Result};
use crate::fmt::money;
use crate::models::Submission;
use crate::store;

/// Record the result of receipt OCR extraction against a submission. The
/// extraction arrives from the upstream validation service; it is only
/// applied to the authoritative amount when matching runs.
pub fn record_extraction(
    conn: &Connection,
    submission_id: i64,
    amount_cents: i64,
    confidence: i64,
) -> Result<()> {
    if !(0..=100).contains(&confidence) {
        return Err(MatchbookError::InvalidInput(format!(
            "extraction confidence must be 0-100, got {confidence}"
        )));
    }
    if amount_cents <= 0 {
        return Err(MatchbookError::InvalidInput(
            "extracted amount must be positive".to_string(),
        ));
    }
    let submission = store::get_submission(conn, submission_id)?;
    if submission.status.is_terminal() {
        return Err(MatchbookError::InvalidInput(format!(
            "submission {submission_id} is already {}",
            submission.status.as_str()
        )));
    }
    conn.execute(
        "UPDATE submissions SET receipt_amount_cents = ?2, receipt_confidence = ?3, \
         updated_at = datetime('now') WHERE id = ?1",
        rusqlite::params![submission_id, amount_cents, confidence],
    )?;
    Ok(())
}

/// Apply a recorded receipt extraction to the submission's authoritative
/// amount. Must run before candidate search; returns the corrected submission
/// when the amount changed. The submitted amount is preserved as an audit
/// field and the override is logged as a correction.
pub fn apply_amount_correction(
    conn: &Connection,
    submission: &Submission,
    min_confidence: i64,
) -> Result<Submission> {
    let (Some(extracted), Some(confidence)) =
        (submission.receipt_amount_cents, submission.receipt_confidence)
    else {
        return Ok(submission.clone());
    };
    if confidence < min_confidence {
        return Ok(submission.clone());
    }
    // Discrepancies of a cent or less are rounding noise, not corrections.
    if (extracted - submission.amount_cents).abs() <= 1 {
        return Ok(submission.clone());
    }

    conn.execute(
        "UPDATE submissions SET amount_cents = ?2, \
         original_amount_cents = COALESCE(original_amount_cents, ?3), \
         updated_at = datetime('now') WHERE id = ?1",
        rusqlite::params![submission.id, extracted, submission.amount_cents],
    )?;
    corrections::log(
        conn,
        Some(submission.id),
        "amount",
        Some(&money(submission.amount_cents)),
        Some(&money(extracted)),
        Some(confidence),
        "receipt",
    );
    store::get_submission(conn, submission.id)
}
