use chrono::{Duration, NaiveDate};
use rusqlite::Connection;

use crate::error::Result;
use crate::importer::extract_vendor;
use crate::ledger::{self, LedgerPoster, PostKind, PostRequest};
use crate::matcher::record_error;
use crate::models::BankTransaction;
use crate::rules;
use crate::settings::Settings;
use crate::store;

const MAX_RETRY_ATTEMPTS: i64 = 3;

#[derive(Debug, Default)]
pub struct SweepResult {
    pub examined: usize,
    pub processed: usize,
    pub queued: usize,
    pub errors: usize,
}

/// Bank transactions that never got a submission: after the grace period,
/// resolve them from vendor rules or queue them for review. Re-running the
/// sweep is safe — only transactions still `unmatched` are examined, capped
/// per run.
pub fn sweep(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    settings: &Settings,
    today: NaiveDate,
) -> Result<SweepResult> {
    let cutoff = (today - Duration::days(settings.orphans.grace_days)).to_string();
    // A transaction suggested to an in-review submission is spoken for, not
    // orphaned; the sweep must not post it out from under the reviewer.
    let sql = format!(
        "SELECT {} FROM bank_transactions \
         WHERE status = 'unmatched' AND transaction_date < ?1 \
           AND id NOT IN (SELECT suggested_transaction_id FROM submissions \
                          WHERE status = 'flagged' AND suggested_transaction_id IS NOT NULL) \
         ORDER BY transaction_date LIMIT ?2",
        BankTransaction::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let orphans: Vec<BankTransaction> = stmt
        .query_map(
            rusqlite::params![cutoff, settings.orphans.batch_limit],
            BankTransaction::from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut result = SweepResult {
        examined: orphans.len(),
        ..Default::default()
    };

    for txn in orphans {
        match resolve_orphan(conn, poster, &txn) {
            Ok(true) => result.processed += 1,
            Ok(false) => result.queued += 1,
            Err(e) => {
                record_error(conn, "transaction", txn.id, "ledger_post", &e.to_string());
                result.errors += 1;
            }
        }
    }
    Ok(result)
}

/// Returns true when the orphan was auto-resolved and posted, false when it
/// was queued for review.
fn resolve_orphan(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    txn: &BankTransaction,
) -> Result<bool> {
    let vendor = txn
        .extracted_vendor
        .clone()
        .or_else(|| extract_vendor(&txn.description));

    let rule = match &vendor {
        Some(v) => rules::find_rule(conn, v)?,
        None => None,
    };

    // A rule with a state default resolves the orphan outright; anything
    // less needs a human.
    let Some(rule) = rule.filter(|r| r.state.is_some()) else {
        conn.execute(
            "UPDATE bank_transactions SET status = 'pending_review', updated_at = datetime('now') \
             WHERE id = ?1 AND status = 'unmatched'",
            [txn.id],
        )?;
        return Ok(false);
    };
    let state = rule.state.clone().unwrap_or_default();
    let category = rule.category.clone().unwrap_or_else(|| "Uncategorized".to_string());

    if !store::claim_orphan(conn, txn.id, &category, &state)? {
        // Someone matched it between the select and the claim; leave it be.
        return Ok(false);
    }

    let request = PostRequest::new(
        PostKind::Purchase,
        txn.amount_cents,
        vendor.as_deref().unwrap_or("Unknown Vendor"),
        Some(&category),
        &state,
        &txn.transaction_date,
    );
    match ledger::post_once(conn, poster, PostKind::Purchase, "transaction", txn.id, request) {
        Ok(posted_id) => {
            store::record_transaction_post(conn, txn.id, &posted_id)?;
            rules::record_use(conn, rule.id)?;
            Ok(true)
        }
        Err(e) => {
            store::release_transaction(conn, txn.id)?;
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Stuck-submission recovery
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecoverResult {
    pub recovered: usize,
    pub flagged: usize,
}

/// Submissions stranded mid-flight by a crash: matcher runs are synchronous,
/// so anything still `processing` or `matched_high_confidence` outside one is
/// a leftover. Claims that never reached the ledger are released, and the
/// submission retries until the attempt cap, then lands in review.
pub fn recover_stuck(conn: &Connection) -> Result<RecoverResult> {
    let mut stmt = conn.prepare(
        "SELECT id, attempts FROM submissions \
         WHERE status IN ('processing', 'matched_high_confidence')",
    )?;
    let stuck: Vec<(i64, i64)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut result = RecoverResult::default();
    for (id, attempts) in stuck {
        // Release any claim that never made it to the ledger.
        conn.execute(
            "UPDATE bank_transactions SET status = 'unmatched', matched_submission_id = NULL, \
             matched_by = NULL, match_confidence = NULL, updated_at = datetime('now') \
             WHERE matched_submission_id = ?1 AND status = 'matched' AND ledger_post_id IS NULL",
            [id],
        )?;

        if attempts < MAX_RETRY_ATTEMPTS {
            conn.execute(
                "UPDATE submissions SET status = 'pending', \
                 last_error = 'Recovered from stuck state (attempt ' || attempts || ')', \
                 updated_at = datetime('now') WHERE id = ?1",
                [id],
            )?;
            result.recovered += 1;
        } else {
            conn.execute(
                "UPDATE submissions SET status = 'flagged', flag_kind = 'anomaly', \
                 flag_reason = 'Max retry attempts exceeded', \
                 last_error = 'Processing repeatedly failed - manual review required', \
                 updated_at = datetime('now') WHERE id = ?1",
                [id],
            )?;
            result.flagged += 1;
        }
    }
    Ok(result)
}
