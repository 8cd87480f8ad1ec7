use rusqlite::Connection;

use crate::corrections;
use crate::error::{MatchbookError, Result};
use crate::fmt::money;
use crate::ledger::{self, LedgerPoster, PostKind, PostRequest};
use crate::matcher;
use crate::models::{FlagKind, Submission, SubmissionStatus, TxnStatus};
use crate::rules;
use crate::settings::Settings;
use crate::states;
use crate::store;

// ---------------------------------------------------------------------------
// Action surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRef {
    Submission(i64),
    Transaction(i64),
    Error(i64),
}

/// Parse a queue handle: S-<id>, T-<id>, or E-<id>.
pub fn parse_item_ref(s: &str) -> Result<ItemRef> {
    let err = || MatchbookError::UnknownReviewItem(s.to_string());
    let (prefix, id) = s.split_once('-').ok_or_else(err)?;
    let id: i64 = id.parse().map_err(|_| err())?;
    match prefix {
        "S" | "s" => Ok(ItemRef::Submission(id)),
        "T" | "t" => Ok(ItemRef::Transaction(id)),
        "E" | "e" => Ok(ItemRef::Error(id)),
        _ => Err(err()),
    }
}

#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub category: Option<String>,
    pub state: Option<String>,
    pub amount_cents: Option<i64>,
    pub transaction_id: Option<i64>,
    pub method: Option<String>,
    pub pattern: Option<String>,
}

#[derive(Debug)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

impl ActionOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn noop(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Execute a human decision against a queue item. Invalid input is rejected
/// before any store mutation; re-applying an action to an already-settled
/// item is a no-op, never a second ledger post.
pub fn execute(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    settings: &Settings,
    item_ref: ItemRef,
    action: &str,
    overrides: &Overrides,
) -> Result<ActionOutcome> {
    validate_overrides(overrides)?;
    match (item_ref, action) {
        (ItemRef::Submission(id), "approve") => approve(conn, poster, id),
        (ItemRef::Submission(id), "correct-approve") => {
            correct_and_approve(conn, poster, id, overrides)
        }
        (ItemRef::Submission(id), "reject") => reject(conn, id),
        (ItemRef::Submission(id), "reimburse") => reimburse(conn, poster, id, overrides),
        (ItemRef::Submission(id), "resubmit") => resubmit(conn, poster, settings, id, overrides),
        (ItemRef::Submission(id), "create-rule") => create_rule_from_submission(conn, id, overrides),
        (ItemRef::Transaction(id), "exclude") => exclude(conn, id),
        (ItemRef::Transaction(id), "resolve-orphan") => resolve_orphan(conn, poster, id, overrides),
        (ItemRef::Transaction(id), "create-rule") => create_rule_from_transaction(conn, id, overrides),
        (ItemRef::Error(id), "retry") => retry_error(conn, id),
        (ItemRef::Error(id), "investigate") => set_error_status(conn, id, "investigating"),
        (ItemRef::Error(id), "resolve") => set_error_status(conn, id, "resolved"),
        (ItemRef::Error(id), "ignore") => set_error_status(conn, id, "ignored"),
        (_, action) => Err(MatchbookError::InvalidInput(format!(
            "action '{action}' does not apply to this item"
        ))),
    }
}

fn validate_overrides(overrides: &Overrides) -> Result<()> {
    if let Some(state) = &overrides.state {
        if states::normalize_state(state).is_none() {
            return Err(MatchbookError::InvalidInput(format!(
                "unrecognized state '{state}'"
            )));
        }
    }
    if let Some(amount) = overrides.amount_cents {
        if amount <= 0 {
            return Err(MatchbookError::InvalidInput(
                "override amount must be positive".to_string(),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Submission actions
// ---------------------------------------------------------------------------

fn approve(conn: &Connection, poster: &dyn LedgerPoster, id: i64) -> Result<ActionOutcome> {
    let submission = store::get_submission(conn, id)?;
    if submission.status.is_terminal() {
        return Ok(ActionOutcome::noop(format!(
            "submission {id} is already {}",
            submission.status.as_str()
        )));
    }
    if submission.status != SubmissionStatus::Flagged {
        return Ok(ActionOutcome::failed(format!(
            "submission {id} is {} and cannot be approved",
            submission.status.as_str()
        )));
    }
    let Some(txn_id) = submission.suggested_transaction_id else {
        return Ok(ActionOutcome::failed(
            "no suggested transaction; use correct-approve with --transaction",
        ));
    };
    let Some(state) = submission.suggested_state.clone() else {
        return Ok(ActionOutcome::failed(
            "no suggested state; use correct-approve with --state",
        ));
    };

    post_submission(
        conn,
        poster,
        &submission,
        txn_id,
        &state,
        submission.category.as_deref(),
        submission.amount_cents,
        SubmissionStatus::Posted,
    )?;

    // The prediction was confirmed as-is: feed that back to the rule table
    // and the audit log.
    if let Some(vendor) = &submission.vendor {
        rules::learn_confirmation(conn, vendor)?;
    }
    corrections::log(
        conn,
        Some(id),
        "state",
        Some(&state),
        Some(&state),
        Some(100),
        "human",
    );

    Ok(ActionOutcome::ok(format!(
        "submission {id} approved and posted ({})",
        money(submission.amount_cents)
    )))
}

fn correct_and_approve(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    id: i64,
    overrides: &Overrides,
) -> Result<ActionOutcome> {
    let submission = store::get_submission(conn, id)?;
    if submission.status.is_terminal() {
        return Ok(ActionOutcome::noop(format!(
            "submission {id} is already {}",
            submission.status.as_str()
        )));
    }
    if submission.status != SubmissionStatus::Flagged {
        return Ok(ActionOutcome::failed(format!(
            "submission {id} is {} and cannot be corrected",
            submission.status.as_str()
        )));
    }

    let Some(txn_id) = overrides.transaction_id.or(submission.suggested_transaction_id) else {
        return Ok(ActionOutcome::failed(
            "no transaction selected; pass --transaction",
        ));
    };
    let state = match overrides
        .state
        .as_deref()
        .and_then(states::normalize_state)
        .or_else(|| submission.suggested_state.clone())
    {
        Some(s) => s,
        None => {
            return Ok(ActionOutcome::failed("no state available; pass --state"));
        }
    };
    let category = overrides.category.clone().or_else(|| submission.category.clone());
    let amount = overrides.amount_cents.unwrap_or(submission.amount_cents);

    post_submission(
        conn,
        poster,
        &submission,
        txn_id,
        &state,
        category.as_deref(),
        amount,
        SubmissionStatus::Corrected,
    )?;

    // Audit every overridden field and teach the rule table the human's
    // final values.
    if submission.suggested_state.as_deref() != Some(state.as_str()) {
        corrections::log(
            conn,
            Some(id),
            "state",
            submission.suggested_state.as_deref(),
            Some(&state),
            Some(100),
            "human",
        );
    }
    if let Some(new_category) = &overrides.category {
        if submission.category.as_deref() != Some(new_category.as_str()) {
            corrections::log(
                conn,
                Some(id),
                "category",
                submission.category.as_deref(),
                Some(new_category),
                Some(100),
                "human",
            );
        }
    }
    if amount != submission.amount_cents {
        corrections::log(
            conn,
            Some(id),
            "amount",
            Some(&money(submission.amount_cents)),
            Some(&money(amount)),
            Some(100),
            "human",
        );
        conn.execute(
            "UPDATE submissions SET amount_cents = ?2, \
             original_amount_cents = COALESCE(original_amount_cents, ?3) WHERE id = ?1",
            rusqlite::params![id, amount, submission.amount_cents],
        )?;
    }
    if let Some(vendor) = &submission.vendor {
        rules::learn_correction(conn, vendor, category.as_deref(), Some(&state))?;
    }

    Ok(ActionOutcome::ok(format!(
        "submission {id} corrected and posted as {state} ({} corrections logged)",
        corrections::count_for_submission(conn, id)
    )))
}

/// Shared claim-post-finalize flow for approve and correct-approve.
#[allow(clippy::too_many_arguments)]
fn post_submission(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    submission: &Submission,
    txn_id: i64,
    state: &str,
    category: Option<&str>,
    amount_cents: i64,
    final_status: SubmissionStatus,
) -> Result<()> {
    let txn = store::get_transaction(conn, txn_id)?;
    // The suggested match may have been claimed since the queue was listed.
    if txn.status != TxnStatus::Unmatched
        && txn.matched_submission_id != Some(submission.id)
    {
        return Err(MatchbookError::InvalidInput(format!(
            "transaction {txn_id} is no longer available ({})",
            txn.status.as_str()
        )));
    }
    if txn.status == TxnStatus::Unmatched
        && !store::claim_transaction(conn, txn_id, submission.id, "human", 100)?
    {
        return Err(MatchbookError::InvalidInput(format!(
            "transaction {txn_id} was claimed concurrently"
        )));
    }

    let vendor = submission
        .vendor
        .as_deref()
        .or(txn.extracted_vendor.as_deref())
        .unwrap_or("Unknown Vendor");
    let request = PostRequest::new(
        PostKind::Purchase,
        amount_cents,
        vendor,
        category,
        state,
        &submission.expense_date,
    );
    match ledger::post_once(conn, poster, PostKind::Purchase, "submission", submission.id, request)
    {
        Ok(posted_id) => {
            conn.execute(
                "UPDATE submissions SET status = ?2, state = ?3, category = ?4, \
                 suggested_transaction_id = ?5, match_confidence = 100, ledger_post_id = ?6, \
                 flag_kind = NULL, flag_reason = NULL, last_error = NULL, \
                 posted_at = datetime('now'), updated_at = datetime('now') WHERE id = ?1",
                rusqlite::params![
                    submission.id,
                    final_status.as_str(),
                    state,
                    category,
                    txn_id,
                    posted_id
                ],
            )?;
            store::record_transaction_post(conn, txn_id, &posted_id)?;
            Ok(())
        }
        Err(e) => {
            store::release_transaction(conn, txn_id)?;
            matcher::record_error(conn, "submission", submission.id, "ledger_post", &e.to_string());
            conn.execute(
                "UPDATE submissions SET last_error = ?2, updated_at = datetime('now') WHERE id = ?1",
                rusqlite::params![submission.id, e.to_string()],
            )?;
            Err(e)
        }
    }
}

fn reject(conn: &Connection, id: i64) -> Result<ActionOutcome> {
    let submission = store::get_submission(conn, id)?;
    if submission.status == SubmissionStatus::Rejected {
        return Ok(ActionOutcome::noop(format!("submission {id} is already rejected")));
    }
    if submission.status.is_terminal() {
        return Ok(ActionOutcome::failed(format!(
            "submission {id} is already {}",
            submission.status.as_str()
        )));
    }
    conn.execute(
        "UPDATE submissions SET status = 'rejected', suggested_transaction_id = NULL, \
         updated_at = datetime('now') WHERE id = ?1",
        [id],
    )?;
    Ok(ActionOutcome::ok(format!("submission {id} rejected; no ledger post")))
}

fn reimburse(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    id: i64,
    overrides: &Overrides,
) -> Result<ActionOutcome> {
    let submission = store::get_submission(conn, id)?;
    if submission.status.is_terminal() {
        return Ok(ActionOutcome::noop(format!(
            "submission {id} is already {}",
            submission.status.as_str()
        )));
    }
    if submission.flag_kind != Some(FlagKind::Reimbursement) {
        return Ok(ActionOutcome::failed(format!(
            "submission {id} is not a reimbursement candidate"
        )));
    }
    let Some(method) = overrides.method.clone() else {
        return Err(MatchbookError::InvalidInput(
            "reimburse requires --method (e.g. check, payroll)".to_string(),
        ));
    };

    // Personal-funds expenses still need a booking state.
    let state = match overrides.state.as_deref().and_then(states::normalize_state) {
        Some(s) => s,
        None => {
            let date = chrono::NaiveDate::parse_from_str(&submission.expense_date, "%Y-%m-%d")
                .map_err(|_| {
                    MatchbookError::InvalidInput(format!(
                        "submission {id} has unparseable date"
                    ))
                })?;
            let decision = states::determine_state(
                conn,
                submission.state_tag.as_deref(),
                date,
                submission.vendor.as_deref(),
            )?;
            if !decision.is_known() {
                return Ok(ActionOutcome::failed(
                    "state could not be determined; pass --state",
                ));
            }
            decision.state
        }
    };

    let vendor = submission.vendor.as_deref().unwrap_or("Unknown Vendor");
    let request = PostRequest::new(
        PostKind::Bill,
        submission.amount_cents,
        vendor,
        submission.category.as_deref(),
        &state,
        &submission.expense_date,
    )
    .with_method(&method);
    let posted_id = ledger::post_once(conn, poster, PostKind::Bill, "submission", id, request)?;

    conn.execute(
        "UPDATE submissions SET status = 'posted', state = ?2, ledger_post_id = ?3, \
         flag_kind = NULL, flag_reason = NULL, posted_at = datetime('now'), \
         updated_at = datetime('now') WHERE id = ?1",
        rusqlite::params![id, state, posted_id],
    )?;
    Ok(ActionOutcome::ok(format!(
        "submission {id} reimbursed via {method} ({})",
        money(submission.amount_cents)
    )))
}

fn resubmit(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    settings: &Settings,
    id: i64,
    overrides: &Overrides,
) -> Result<ActionOutcome> {
    let submission = store::get_submission(conn, id)?;
    if submission.status != SubmissionStatus::Flagged {
        return Ok(ActionOutcome::failed(format!(
            "submission {id} is {} and cannot be resubmitted",
            submission.status.as_str()
        )));
    }

    if let Some(category) = &overrides.category {
        corrections::log(
            conn,
            Some(id),
            "category",
            submission.category.as_deref(),
            Some(category),
            Some(100),
            "human",
        );
        conn.execute(
            "UPDATE submissions SET category = ?2 WHERE id = ?1",
            rusqlite::params![id, category],
        )?;
    }
    if let Some(state) = overrides.state.as_deref().and_then(states::normalize_state) {
        corrections::log(
            conn,
            Some(id),
            "state",
            submission.state_tag.as_deref(),
            Some(&state),
            Some(100),
            "human",
        );
        conn.execute(
            "UPDATE submissions SET state_tag = ?2 WHERE id = ?1",
            rusqlite::params![id, state],
        )?;
    }
    if let Some(amount) = overrides.amount_cents {
        corrections::log(
            conn,
            Some(id),
            "amount",
            Some(&money(submission.amount_cents)),
            Some(&money(amount)),
            Some(100),
            "human",
        );
        conn.execute(
            "UPDATE submissions SET amount_cents = ?2, \
             original_amount_cents = COALESCE(original_amount_cents, ?3) WHERE id = ?1",
            rusqlite::params![id, amount, submission.amount_cents],
        )?;
    }

    conn.execute(
        "UPDATE submissions SET status = 'pending', attempts = 0, flag_kind = NULL, \
         flag_reason = NULL, suggested_transaction_id = NULL, suggested_state = NULL, \
         suggested_state_source = NULL, match_confidence = NULL, last_error = NULL, \
         updated_at = datetime('now') WHERE id = ?1",
        [id],
    )?;

    let disposition = matcher::process_submission(conn, poster, settings, id)?;
    Ok(ActionOutcome::ok(format!(
        "submission {id} resubmitted; matcher outcome: {disposition:?}"
    )))
}

fn create_rule_from_submission(
    conn: &Connection,
    id: i64,
    overrides: &Overrides,
) -> Result<ActionOutcome> {
    let submission = store::get_submission(conn, id)?;
    let Some(pattern) = overrides.pattern.clone().or_else(|| submission.vendor.clone()) else {
        return Err(MatchbookError::InvalidInput(
            "no vendor on submission; pass --pattern".to_string(),
        ));
    };
    upsert_rule(conn, &pattern, overrides, submission.category.as_deref())
}

// ---------------------------------------------------------------------------
// Transaction (orphan) actions
// ---------------------------------------------------------------------------

fn exclude(conn: &Connection, id: i64) -> Result<ActionOutcome> {
    let txn = store::get_transaction(conn, id)?;
    match txn.status {
        TxnStatus::Excluded => Ok(ActionOutcome::noop(format!("transaction {id} is already excluded"))),
        TxnStatus::Matched | TxnStatus::OrphanProcessed => Ok(ActionOutcome::failed(format!(
            "transaction {id} is {} and cannot be excluded",
            txn.status.as_str()
        ))),
        TxnStatus::Unmatched | TxnStatus::PendingReview => {
            conn.execute(
                "UPDATE bank_transactions SET status = 'excluded', updated_at = datetime('now') \
                 WHERE id = ?1",
                [id],
            )?;
            Ok(ActionOutcome::ok(format!("transaction {id} excluded; no ledger post")))
        }
    }
}

fn resolve_orphan(
    conn: &Connection,
    poster: &dyn LedgerPoster,
    id: i64,
    overrides: &Overrides,
) -> Result<ActionOutcome> {
    let txn = store::get_transaction(conn, id)?;
    if txn.status == TxnStatus::OrphanProcessed {
        return Ok(ActionOutcome::noop(format!("transaction {id} is already processed")));
    }
    if txn.status != TxnStatus::PendingReview {
        return Ok(ActionOutcome::failed(format!(
            "transaction {id} is {} and cannot be resolved as an orphan",
            txn.status.as_str()
        )));
    }

    let vendor = txn.extracted_vendor.clone();
    let rule = match &vendor {
        Some(v) => rules::find_rule(conn, v)?,
        None => None,
    };
    let category = overrides
        .category
        .clone()
        .or_else(|| rule.as_ref().and_then(|r| r.category.clone()))
        .unwrap_or_else(|| "Uncategorized".to_string());
    let Some(state) = overrides
        .state
        .as_deref()
        .and_then(states::normalize_state)
        .or_else(|| rule.as_ref().and_then(|r| r.state.clone()))
    else {
        return Ok(ActionOutcome::failed("no state available; pass --state"));
    };

    let claimed = conn.execute(
        "UPDATE bank_transactions SET status = 'orphan_processed', matched_by = 'human', \
         orphan_category = ?2, orphan_state = ?3, updated_at = datetime('now') \
         WHERE id = ?1 AND status = 'pending_review'",
        rusqlite::params![id, category, state],
    )?;
    if claimed != 1 {
        return Ok(ActionOutcome::failed(format!(
            "transaction {id} changed state concurrently"
        )));
    }

    let request = PostRequest::new(
        PostKind::Purchase,
        txn.amount_cents,
        vendor.as_deref().unwrap_or("Unknown Vendor"),
        Some(&category),
        &state,
        &txn.transaction_date,
    );
    match ledger::post_once(conn, poster, PostKind::Purchase, "transaction", id, request) {
        Ok(posted_id) => {
            store::record_transaction_post(conn, id, &posted_id)?;
            if let Some(v) = &vendor {
                rules::learn_correction(conn, v, Some(&category), Some(&state))?;
            }
            Ok(ActionOutcome::ok(format!(
                "orphan {id} posted as {category}/{state}"
            )))
        }
        Err(e) => {
            conn.execute(
                "UPDATE bank_transactions SET status = 'pending_review', matched_by = NULL, \
                 orphan_category = NULL, orphan_state = NULL, updated_at = datetime('now') \
                 WHERE id = ?1 AND ledger_post_id IS NULL",
                [id],
            )?;
            matcher::record_error(conn, "transaction", id, "ledger_post", &e.to_string());
            Err(e)
        }
    }
}

fn create_rule_from_transaction(
    conn: &Connection,
    id: i64,
    overrides: &Overrides,
) -> Result<ActionOutcome> {
    let txn = store::get_transaction(conn, id)?;
    let Some(pattern) = overrides.pattern.clone().or(txn.extracted_vendor) else {
        return Err(MatchbookError::InvalidInput(
            "no vendor on transaction; pass --pattern".to_string(),
        ));
    };
    upsert_rule(conn, &pattern, overrides, None)
}

fn upsert_rule(
    conn: &Connection,
    pattern: &str,
    overrides: &Overrides,
    fallback_category: Option<&str>,
) -> Result<ActionOutcome> {
    let state = overrides.state.as_deref().and_then(states::normalize_state);
    let category = overrides.category.as_deref().or(fallback_category);
    rules::upsert(conn, pattern, category, state.as_deref(), 80)?;
    Ok(ActionOutcome::ok(format!(
        "vendor rule '{}' saved",
        pattern.to_lowercase()
    )))
}

// ---------------------------------------------------------------------------
// Processing-error actions
// ---------------------------------------------------------------------------

fn get_error(conn: &Connection, id: i64) -> Result<(String, i64, String)> {
    conn.query_row(
        "SELECT source_kind, source_id, status FROM processing_errors WHERE id = ?1",
        [id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )
    .map_err(|_| MatchbookError::UnknownReviewItem(format!("E-{id}")))
}

fn retry_error(conn: &Connection, id: i64) -> Result<ActionOutcome> {
    let (source_kind, source_id, status) = get_error(conn, id)?;
    if status == "resolved" || status == "ignored" {
        return Ok(ActionOutcome::noop(format!("error {id} is already {status}")));
    }

    conn.execute(
        "UPDATE processing_errors SET retry_count = retry_count + 1, status = 'investigating', \
         updated_at = datetime('now') WHERE id = ?1",
        [id],
    )?;

    if source_kind == "submission" {
        let submission = store::get_submission(conn, source_id)?;
        if submission.status.is_terminal() {
            return Ok(ActionOutcome::noop(format!(
                "submission {source_id} already settled; nothing to retry"
            )));
        }
        conn.execute(
            "UPDATE submissions SET status = 'pending', updated_at = datetime('now') WHERE id = ?1",
            [source_id],
        )?;
        return Ok(ActionOutcome::ok(format!(
            "submission {source_id} re-enqueued for matching"
        )));
    }
    // Orphan transactions stay unmatched after a failed post; the next sweep
    // picks them up again.
    Ok(ActionOutcome::ok(format!(
        "transaction {source_id} will be retried on the next sweep"
    )))
}

fn set_error_status(conn: &Connection, id: i64, new_status: &str) -> Result<ActionOutcome> {
    let (_, _, status) = get_error(conn, id)?;
    if status == new_status {
        return Ok(ActionOutcome::noop(format!("error {id} is already {new_status}")));
    }
    conn.execute(
        "UPDATE processing_errors SET status = ?2, updated_at = datetime('now') WHERE id = ?1",
        rusqlite::params![id, new_status],
    )?;
    Ok(ActionOutcome::ok(format!("error {id} marked {new_status}")))
}
