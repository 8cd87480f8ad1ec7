use rusqlite::Row;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Unmatched,
    Matched,
    Excluded,
    OrphanProcessed,
    PendingReview,
}

impl TxnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Matched => "matched",
            Self::Excluded => "excluded",
            Self::OrphanProcessed => "orphan_processed",
            Self::PendingReview => "pending_review",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "matched" => Self::Matched,
            "excluded" => Self::Excluded,
            "orphan_processed" => Self::OrphanProcessed,
            "pending_review" => Self::PendingReview,
            _ => Self::Unmatched,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Pending,
    Processing,
    MatchedHighConfidence,
    Posted,
    Flagged,
    Rejected,
    Corrected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::MatchedHighConfidence => "matched_high_confidence",
            Self::Posted => "posted",
            Self::Flagged => "flagged",
            Self::Rejected => "rejected",
            Self::Corrected => "corrected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "matched_high_confidence" => Self::MatchedHighConfidence,
            "posted" => Self::Posted,
            "flagged" => Self::Flagged,
            "rejected" => Self::Rejected,
            "corrected" => Self::Corrected,
            _ => Self::Pending,
        }
    }

    /// Terminal statuses cannot be mutated by the matcher or review actions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Posted | Self::Rejected | Self::Corrected)
    }
}

/// Why a flagged submission is sitting in the review queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    LowConfidence,
    Reimbursement,
    Anomaly,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::Reimbursement => "reimbursement",
            Self::Anomaly => "anomaly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low_confidence" => Some(Self::LowConfidence),
            "reimbursement" => Some(Self::Reimbursement),
            "anomaly" => Some(Self::Anomaly),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct BankTransaction {
    pub id: i64,
    pub source: String,
    pub transaction_date: String,
    pub description: String,
    pub amount_cents: i64,
    pub extracted_vendor: Option<String>,
    pub status: TxnStatus,
    pub matched_submission_id: Option<i64>,
    pub matched_by: Option<String>,
    pub match_confidence: Option<i64>,
    pub orphan_category: Option<String>,
    pub orphan_state: Option<String>,
    pub ledger_post_id: Option<String>,
}

impl BankTransaction {
    pub const COLUMNS: &'static str = "id, source, transaction_date, description, amount_cents, \
         extracted_vendor, status, matched_submission_id, matched_by, match_confidence, \
         orphan_category, orphan_state, ledger_post_id";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source: row.get(1)?,
            transaction_date: row.get(2)?,
            description: row.get(3)?,
            amount_cents: row.get(4)?,
            extracted_vendor: row.get(5)?,
            status: TxnStatus::parse(&row.get::<_, String>(6)?),
            matched_submission_id: row.get(7)?,
            matched_by: row.get(8)?,
            match_confidence: row.get(9)?,
            orphan_category: row.get(10)?,
            orphan_state: row.get(11)?,
            ledger_post_id: row.get(12)?,
        })
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: i64,
    pub external_id: String,
    pub report_id: Option<String>,
    pub expense_date: String,
    pub amount_cents: i64,
    pub original_amount_cents: Option<i64>,
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub submitter: Option<String>,
    pub state_tag: Option<String>,
    pub receipt_ref: Option<String>,
    pub receipt_amount_cents: Option<i64>,
    pub receipt_confidence: Option<i64>,
    pub status: SubmissionStatus,
    pub flag_kind: Option<FlagKind>,
    pub flag_reason: Option<String>,
    pub suggested_transaction_id: Option<i64>,
    pub suggested_state: Option<String>,
    pub match_confidence: Option<i64>,
    pub state: Option<String>,
    pub ledger_post_id: Option<String>,
    pub attempts: i64,
    pub last_error: Option<String>,
}

impl Submission {
    pub const COLUMNS: &'static str = "id, external_id, report_id, expense_date, amount_cents, \
         original_amount_cents, vendor, category, submitter, state_tag, receipt_ref, \
         receipt_amount_cents, receipt_confidence, status, flag_kind, flag_reason, \
         suggested_transaction_id, suggested_state, match_confidence, state, ledger_post_id, \
         attempts, last_error";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            external_id: row.get(1)?,
            report_id: row.get(2)?,
            expense_date: row.get(3)?,
            amount_cents: row.get(4)?,
            original_amount_cents: row.get(5)?,
            vendor: row.get(6)?,
            category: row.get(7)?,
            submitter: row.get(8)?,
            state_tag: row.get(9)?,
            receipt_ref: row.get(10)?,
            receipt_amount_cents: row.get(11)?,
            receipt_confidence: row.get(12)?,
            status: SubmissionStatus::parse(&row.get::<_, String>(13)?),
            flag_kind: row
                .get::<_, Option<String>>(14)?
                .and_then(|k| FlagKind::parse(&k)),
            flag_reason: row.get(15)?,
            suggested_transaction_id: row.get(16)?,
            suggested_state: row.get(17)?,
            match_confidence: row.get(18)?,
            state: row.get(19)?,
            ledger_post_id: row.get(20)?,
            attempts: row.get(21)?,
            last_error: row.get(22)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VendorRule {
    pub id: i64,
    pub pattern: String,
    pub match_type: String,
    pub category: Option<String>,
    pub state: Option<String>,
    pub confidence: i64,
    pub priority: i64,
    pub hit_count: i64,
}

#[derive(Debug, Clone)]
pub struct ProcessingError {
    pub id: i64,
    pub source_kind: String,
    pub source_id: i64,
    pub stage: String,
    pub message: String,
    pub retry_count: i64,
    pub status: String,
}
