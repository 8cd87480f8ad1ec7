use chrono::NaiveDate;
use rusqlite::Connection;

use crate::error::{MatchbookError, Result};
use crate::models::{BankTransaction, FlagKind, ProcessingError, Submission, TxnStatus};
use crate::rules;
use crate::settings::Settings;
use crate::store;

// ---------------------------------------------------------------------------
// Item kinds and the priority order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    ProcessingError,
    Flagged,
    LowConfidence,
    Orphan,
    Reimbursement,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessingError => "processing_error",
            Self::Flagged => "flagged",
            Self::LowConfidence => "low_confidence",
            Self::Orphan => "orphan",
            Self::Reimbursement => "reimbursement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing_error" => Some(Self::ProcessingError),
            "flagged" => Some(Self::Flagged),
            "low_confidence" => Some(Self::LowConfidence),
            "orphan" => Some(Self::Orphan),
            "reimbursement" => Some(Self::Reimbursement),
            _ => None,
        }
    }

    /// The queue's total order, lower is more urgent. Defined once, here;
    /// everything else compares through it.
    pub fn priority(&self) -> u8 {
        match self {
            Self::ProcessingError => 1,
            Self::Flagged => 2,
            Self::LowConfidence => 3,
            Self::Orphan => 4,
            Self::Reimbursement => 5,
        }
    }
}

// ---------------------------------------------------------------------------
// The polymorphic review item
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ReviewItem {
    LowConfidence {
        submission: Submission,
        suggested: Option<BankTransaction>,
        /// Other in-window candidates a human may pick instead.
        alternates: Vec<BankTransaction>,
    },
    Flagged {
        submission: Submission,
    },
    Reimbursement {
        submission: Submission,
    },
    Orphan {
        transaction: BankTransaction,
        /// Rule that matched but could not fully resolve the orphan.
        rule_hint: Option<String>,
    },
    ProcessingError {
        error: ProcessingError,
    },
}

impl ReviewItem {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::LowConfidence { .. } => ItemKind::LowConfidence,
            Self::Flagged { .. } => ItemKind::Flagged,
            Self::Reimbursement { .. } => ItemKind::Reimbursement,
            Self::Orphan { .. } => ItemKind::Orphan,
            Self::ProcessingError { .. } => ItemKind::ProcessingError,
        }
    }

    /// Stable handle a human quotes back to the action API:
    /// S-<id> for submissions, T-<id> for transactions, E-<id> for errors.
    pub fn item_ref(&self) -> String {
        match self {
            Self::LowConfidence { submission, .. }
            | Self::Flagged { submission }
            | Self::Reimbursement { submission } => format!("S-{}", submission.id),
            Self::Orphan { transaction, .. } => format!("T-{}", transaction.id),
            Self::ProcessingError { error } => format!("E-{}", error.id),
        }
    }

    pub fn vendor(&self) -> Option<&str> {
        match self {
            Self::LowConfidence { submission, .. }
            | Self::Flagged { submission }
            | Self::Reimbursement { submission } => submission.vendor.as_deref(),
            Self::Orphan { transaction, .. } => transaction.extracted_vendor.as_deref(),
            Self::ProcessingError { .. } => None,
        }
    }

    pub fn amount_cents(&self) -> Option<i64> {
        match self {
            Self::LowConfidence { submission, .. }
            | Self::Flagged { submission }
            | Self::Reimbursement { submission } => Some(submission.amount_cents),
            Self::Orphan { transaction, .. } => Some(transaction.amount_cents),
            Self::ProcessingError { .. } => None,
        }
    }

    pub fn date(&self) -> Option<&str> {
        match self {
            Self::LowConfidence { submission, .. }
            | Self::Flagged { submission }
            | Self::Reimbursement { submission } => Some(&submission.expense_date),
            Self::Orphan { transaction, .. } => Some(&transaction.transaction_date),
            Self::ProcessingError { .. } => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::LowConfidence { submission, .. } | Self::Flagged { submission } => submission
                .flag_reason
                .clone()
                .unwrap_or_else(|| "Needs review".to_string()),
            Self::Reimbursement { submission } => format!(
                "No card transaction; reimburse {}",
                submission.submitter.as_deref().unwrap_or("submitter")
            ),
            Self::Orphan { transaction, rule_hint } => match rule_hint {
                Some(hint) => format!("Orphan charge ({hint})"),
                None => format!("Orphan charge: {}", transaction.description),
            },
            Self::ProcessingError { error } => format!(
                "{} {} failed at {}: {} ({}, {} retries)",
                error.source_kind,
                error.source_id,
                error.stage,
                error.message,
                error.status,
                error.retry_count
            ),
        }
    }

    pub fn allowed_actions(&self) -> &'static [&'static str] {
        match self {
            Self::LowConfidence { .. } => {
                &["approve", "correct-approve", "reject", "resubmit", "create-rule"]
            }
            Self::Flagged { .. } => &["correct-approve", "reject", "resubmit", "create-rule"],
            Self::Reimbursement { .. } => &["reimburse", "reject"],
            Self::Orphan { .. } => &["resolve-orphan", "exclude", "create-rule"],
            Self::ProcessingError { .. } => &["retry", "investigate", "resolve", "ignore"],
        }
    }
}

/// The queue comparator: kind priority, then oldest date, then ref.
pub fn compare(a: &ReviewItem, b: &ReviewItem) -> std::cmp::Ordering {
    a.kind()
        .priority()
        .cmp(&b.kind().priority())
        .then_with(|| a.date().unwrap_or("").cmp(b.date().unwrap_or("")))
        .then_with(|| a.item_ref().cmp(&b.item_ref()))
}

// ---------------------------------------------------------------------------
// Normalizers, one per source kind
// ---------------------------------------------------------------------------

fn normalize_flagged_submission(
    conn: &Connection,
    submission: Submission,
    settings: &Settings,
) -> Result<ReviewItem> {
    match submission.flag_kind {
        Some(FlagKind::Reimbursement) => Ok(ReviewItem::Reimbursement { submission }),
        Some(FlagKind::LowConfidence) => {
            let suggested = match submission.suggested_transaction_id {
                Some(id) => Some(store::get_transaction(conn, id)?),
                None => None,
            };
            let date = NaiveDate::parse_from_str(&submission.expense_date, "%Y-%m-%d")
                .map_err(|_| {
                    MatchbookError::InvalidInput(format!(
                        "submission {} has unparseable date",
                        submission.id
                    ))
                })?;
            let alternates = store::candidate_window(
                conn,
                submission.amount_cents,
                date,
                &settings.matching,
            )?
            .into_iter()
            .filter(|t| Some(t.id) != submission.suggested_transaction_id)
            .collect();
            Ok(ReviewItem::LowConfidence {
                submission,
                suggested,
                alternates,
            })
        }
        _ => Ok(ReviewItem::Flagged { submission }),
    }
}

fn normalize_orphan(conn: &Connection, transaction: BankTransaction) -> Result<ReviewItem> {
    let rule_hint = match transaction.extracted_vendor.as_deref() {
        Some(vendor) => rules::find_rule(conn, vendor)?
            .map(|r| format!("rule '{}' has no state default", r.pattern)),
        None => None,
    };
    Ok(ReviewItem::Orphan {
        transaction,
        rule_hint,
    })
}

fn normalize_error(error: ProcessingError) -> ReviewItem {
    ReviewItem::ProcessingError { error }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Materialize the queue: every source that needs a human, normalized and
/// sorted by the priority order. Items are views; acting on one refetches.
pub fn list(conn: &Connection, settings: &Settings, filter: Option<ItemKind>) -> Result<Vec<ReviewItem>> {
    let mut items = Vec::new();

    let sql = format!(
        "SELECT {} FROM submissions WHERE status = 'flagged' ORDER BY id",
        Submission::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let flagged: Vec<Submission> = stmt
        .query_map([], Submission::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for submission in flagged {
        items.push(normalize_flagged_submission(conn, submission, settings)?);
    }

    for transaction in store::transactions_by_status(conn, TxnStatus::PendingReview)? {
        items.push(normalize_orphan(conn, transaction)?);
    }

    let mut stmt = conn.prepare(
        "SELECT id, source_kind, source_id, stage, message, retry_count, status \
         FROM processing_errors WHERE status IN ('new', 'investigating') ORDER BY id",
    )?;
    let errors: Vec<ProcessingError> = stmt
        .query_map([], |row| {
            Ok(ProcessingError {
                id: row.get(0)?,
                source_kind: row.get(1)?,
                source_id: row.get(2)?,
                stage: row.get(3)?,
                message: row.get(4)?,
                retry_count: row.get(5)?,
                status: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for error in errors {
        items.push(normalize_error(error));
    }

    if let Some(kind) = filter {
        items.retain(|i| i.kind() == kind);
    }
    items.sort_by(compare);
    Ok(items)
}
