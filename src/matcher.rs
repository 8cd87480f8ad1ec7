use chrono::NaiveDate;
use rusqlite::Connection;

use crate::corrections;
use crate::error::{MatchbookError, Result};
use crate::fmt::money;
use crate::ledger::{self, LedgerPoster, PostKind, PostRequest};
use crate::models::{BankTransaction, FlagKind, Submission, SubmissionStatus};
use crate::policy::MatchFacts;
use crate::receipt;
use crate::settings::Settings;
use crate::states::{self, StateDecision, StateSource};
use crate::store;

/// Gratuity range a restaurant charge can exceed its receipt by.
const TIP_RATIO_MIN: f64 = 1.15;
const TIP_RATIO_MAX: f64 = 1.25;

#[derive(Debug)]
pub enum Disposition {
    AutoPosted {
        transaction_id: i64,
        posted_id: String,
        confidence: i64,
        state: String,
    },
    Flagged {
        kind: FlagKind,
        reason: String,
        confidence: i64,
    },
    LedgerFailed {
        message: String,
    },
    Skipped {
        status: SubmissionStatus,
    },
}

// ---------------------------------------------------------------------------
// Candidate ranking
// ---------------------------------------------------------------------------

fn date_distance(a: &str, b: NaiveDate) -> i64 {
    match NaiveDate::parse_from_str(a, "%Y-%m-%d") {
        Ok(d) => (d - b).num_days().abs(),
        Err(_) => i64::MAX,
    }
}

/// Order candidates best-first: exact amount beats tolerance, then minimal
/// date distance, then the most recent transaction.
pub fn rank_candidates(
    mut candidates: Vec<BankTransaction>,
    amount_cents: i64,
    date: NaiveDate,
) -> Vec<BankTransaction> {
    candidates.sort_by(|a, b| {
        let a_exact = a.amount_cents == amount_cents;
        let b_exact = b.amount_cents == amount_cents;
        b_exact
            .cmp(&a_exact)
            .then_with(|| {
                date_distance(&a.transaction_date, date).cmp(&date_distance(&b.transaction_date, date))
            })
            .then_with(|| b.transaction_date.cmp(&a.transaction_date))
    });
    candidates
}

/// Swap day and month when the day could be a month (DD/MM vs MM/DD feeds).
fn inverted_date(date: NaiveDate) -> Option<NaiveDate> {
    use chrono::Datelike;
    let day = date.day();
    let month = date.month();
    if day > 12 || day == month {
        return None;
    }
    NaiveDate::from_ymd_opt(date.year(), day, month)
}

fn find_tip_candidate(
    conn: &Connection,
    amount_cents: i64,
    date: NaiveDate,
    tolerance_days: i64,
) -> Result<Option<BankTransaction>> {
    if amount_cents <= 0 {
        return Ok(None);
    }
    let window = store::unmatched_in_date_window(conn, date, tolerance_days)?;
    Ok(window.into_iter().find(|txn| {
        let ratio = txn.amount_cents as f64 / amount_cents as f64;
        (TIP_RATIO_MIN..=TIP_RATIO_MAX).contains(&ratio)
    }))
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

/// Run the matcher over every pending submission, one at a time.
pub fn process_pending(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    settings: &Settings,
) -> Result<Vec<(i64, Disposition)>> {
    let mut outcomes = Vec::new();
    for submission in store::pending_submissions(conn)? {
        let disposition = process_submission(conn, poster, settings, submission.id)?;
        outcomes.push((submission.id, disposition));
    }
    Ok(outcomes)
}

/// Match one submission and adjudicate it: auto-post on high confidence with
/// a known state, otherwise route to the review queue. Exactly one of those
/// side effects happens per invocation; re-invoking on a settled submission
/// is a no-op.
pub fn process_submission(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    settings: &Settings,
    submission_id: i64,
) -> Result<Disposition> {
    let submission = store::get_submission(conn, submission_id)?;
    if submission.status != SubmissionStatus::Pending {
        return Ok(Disposition::Skipped {
            status: submission.status,
        });
    }

    conn.execute(
        "UPDATE submissions SET status = 'processing', attempts = attempts + 1, \
         updated_at = datetime('now') WHERE id = ?1",
        [submission_id],
    )?;

    match run_pipeline(conn, poster, settings, submission_id) {
        Ok(disposition) => Ok(disposition),
        Err(e) => {
            // An unexpected failure must not strand the submission in
            // 'processing' or vanish: record it and flag for review.
            record_error(conn, "submission", submission_id, "matching", &e.to_string());
            flag(
                conn,
                submission_id,
                FlagKind::Anomaly,
                &format!("Processing error: {e}"),
                None,
                None,
                0,
            )?;
            Ok(Disposition::Flagged {
                kind: FlagKind::Anomaly,
                reason: e.to_string(),
                confidence: 0,
            })
        }
    }
}

fn run_pipeline(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    settings: &Settings,
    submission_id: i64,
) -> Result<Disposition> {
    // Amount correction from the receipt must land before candidate search.
    let submission = store::get_submission(conn, submission_id)?;
    let submission =
        receipt::apply_amount_correction(conn, &submission, settings.receipt_min_confidence)?;

    let expense_date = NaiveDate::parse_from_str(&submission.expense_date, "%Y-%m-%d")
        .map_err(|_| {
            MatchbookError::InvalidInput(format!(
                "submission {} has unparseable date '{}'",
                submission.id, submission.expense_date
            ))
        })?;

    let mut submission = submission;
    let mut search_date = expense_date;
    let mut date_was_inverted = false;
    let mut candidates = store::candidate_window(
        conn,
        submission.amount_cents,
        expense_date,
        &settings.matching,
    )?;

    // Feed dates sometimes arrive DD/MM-swapped; retry the window inverted.
    if candidates.is_empty() {
        if let Some(inverted) = inverted_date(expense_date) {
            let inverted_hits = store::candidate_window(
                conn,
                submission.amount_cents,
                inverted,
                &settings.matching,
            )?;
            if !inverted_hits.is_empty() {
                corrections::log(
                    conn,
                    Some(submission.id),
                    "expense_date",
                    Some(&expense_date.to_string()),
                    Some(&inverted.to_string()),
                    None,
                    "matcher",
                );
                conn.execute(
                    "UPDATE submissions SET expense_date = ?2, \
                     original_expense_date = COALESCE(original_expense_date, ?3), \
                     updated_at = datetime('now') WHERE id = ?1",
                    rusqlite::params![
                        submission.id,
                        inverted.to_string(),
                        expense_date.to_string()
                    ],
                )?;
                submission = store::get_submission(conn, submission.id)?;
                search_date = inverted;
                date_was_inverted = true;
                candidates = inverted_hits;
            }
        }
    }

    // Gratuity fallback: the bank charge includes a tip the receipt lacks.
    if candidates.is_empty() {
        if let Some(tip_txn) = find_tip_candidate(
            conn,
            submission.amount_cents,
            expense_date,
            settings.matching.date_tolerance_days,
        )? {
            let confidence = settings.scoring.tip_match_confidence;
            let reason = format!(
                "Bank charge {} likely includes a tip on {}",
                money(tip_txn.amount_cents),
                money(submission.amount_cents)
            );
            let decision = states::determine_state(
                conn,
                submission.state_tag.as_deref(),
                expense_date,
                submission.vendor.as_deref(),
            )?;
            flag(
                conn,
                submission.id,
                FlagKind::LowConfidence,
                &reason,
                Some(&tip_txn),
                Some(&decision),
                confidence,
            )?;
            return Ok(Disposition::Flagged {
                kind: FlagKind::LowConfidence,
                reason,
                confidence,
            });
        }

        // No corporate-card counterpart at all: paid from personal funds.
        let reason = "No bank transaction within tolerance; reimbursement candidate".to_string();
        flag(conn, submission.id, FlagKind::Reimbursement, &reason, None, None, 0)?;
        return Ok(Disposition::Flagged {
            kind: FlagKind::Reimbursement,
            reason,
            confidence: 0,
        });
    }

    let ranked = rank_candidates(candidates, submission.amount_cents, search_date);
    let best = &ranked[0];

    let decision = states::determine_state(
        conn,
        submission.state_tag.as_deref(),
        search_date,
        submission.vendor.as_deref(),
    )?;

    let facts = MatchFacts {
        exact_amount: best.amount_cents == submission.amount_cents,
        date_distance_days: date_distance(&best.transaction_date, search_date),
        state_from_tag: decision.source == StateSource::Tag,
        has_category: submission.category.is_some(),
        date_was_inverted,
    };
    let confidence = settings.scoring.score(&facts);

    if settings.scoring.auto_postable(confidence) && decision.is_known() {
        return auto_post(conn, poster, &submission, best, &decision, confidence);
    }

    let reason = if !decision.is_known() {
        "State could not be determined".to_string()
    } else {
        format!(
            "Confidence {confidence} below auto-post threshold {}",
            settings.scoring.auto_post_threshold
        )
    };
    flag(
        conn,
        submission.id,
        FlagKind::LowConfidence,
        &reason,
        Some(best),
        Some(&decision),
        confidence,
    )?;
    Ok(Disposition::Flagged {
        kind: FlagKind::LowConfidence,
        reason,
        confidence,
    })
}

fn auto_post(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    submission: &Submission,
    txn: &BankTransaction,
    decision: &StateDecision,
    confidence: i64,
) -> Result<Disposition> {
    // Claim before posting so two paths can never book the same charge.
    if !store::claim_transaction(conn, txn.id, submission.id, "matcher", confidence)? {
        let reason = "Best candidate was claimed by another match".to_string();
        flag(conn, submission.id, FlagKind::LowConfidence, &reason, None, Some(decision), confidence)?;
        return Ok(Disposition::Flagged {
            kind: FlagKind::LowConfidence,
            reason,
            confidence,
        });
    }

    conn.execute(
        "UPDATE submissions SET status = 'matched_high_confidence', \
         suggested_transaction_id = ?2, updated_at = datetime('now') WHERE id = ?1",
        rusqlite::params![submission.id, txn.id],
    )?;

    let vendor = submission
        .vendor
        .as_deref()
        .or(txn.extracted_vendor.as_deref())
        .unwrap_or("Unknown Vendor");
    let request = PostRequest::new(
        PostKind::Purchase,
        submission.amount_cents,
        vendor,
        submission.category.as_deref(),
        &decision.state,
        &submission.expense_date,
    );

    match ledger::post_once(conn, poster, PostKind::Purchase, "submission", submission.id, request)
    {
        Ok(posted_id) => {
            conn.execute(
                "UPDATE submissions SET status = 'posted', state = ?2, match_confidence = ?3, \
                 suggested_state = ?2, suggested_state_source = ?4, ledger_post_id = ?5, \
                 flag_kind = NULL, flag_reason = NULL, last_error = NULL, \
                 posted_at = datetime('now'), updated_at = datetime('now') WHERE id = ?1",
                rusqlite::params![
                    submission.id,
                    decision.state,
                    confidence,
                    decision.source.as_str(),
                    posted_id
                ],
            )?;
            store::record_transaction_post(conn, txn.id, &posted_id)?;
            Ok(Disposition::AutoPosted {
                transaction_id: txn.id,
                posted_id,
                confidence,
                state: decision.state.clone(),
            })
        }
        Err(e) => {
            // Compensate: the claim is released and the submission returns to
            // pending so a retry can re-run the whole match.
            store::release_transaction(conn, txn.id)?;
            record_error(conn, "submission", submission.id, "ledger_post", &e.to_string());
            conn.execute(
                "UPDATE submissions SET status = 'pending', last_error = ?2, \
                 updated_at = datetime('now') WHERE id = ?1",
                rusqlite::params![submission.id, e.to_string()],
            )?;
            Ok(Disposition::LedgerFailed {
                message: e.to_string(),
            })
        }
    }
}

fn flag(
    conn: &Connection,
    submission_id: i64,
    kind: FlagKind,
    reason: &str,
    suggested: Option<&BankTransaction>,
    decision: Option<&StateDecision>,
    confidence: i64,
) -> Result<()> {
    let suggested_state = decision.filter(|d| d.is_known()).map(|d| d.state.clone());
    let suggested_source = decision
        .filter(|d| d.is_known())
        .map(|d| d.source.as_str().to_string());
    conn.execute(
        "UPDATE submissions SET status = 'flagged', flag_kind = ?2, flag_reason = ?3, \
         suggested_transaction_id = ?4, suggested_state = ?5, suggested_state_source = ?6, \
         match_confidence = ?7, updated_at = datetime('now') WHERE id = ?1",
        rusqlite::params![
            submission_id,
            kind.as_str(),
            reason,
            suggested.map(|t| t.id),
            suggested_state,
            suggested_source,
            confidence,
        ],
    )?;
    Ok(())
}

pub fn record_error(conn: &Connection, source_kind: &str, source_id: i64, stage: &str, message: &str) {
    let result = conn.execute(
        "INSERT INTO processing_errors (source_kind, source_id, stage, message) \
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![source_kind, source_id, stage, message],
    );
    if let Err(e) = result {
        eprintln!("warning: failed to record processing error for {source_kind} {source_id}: {e}");
    }
}
