use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchbookError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unknown card source: {0}")]
    UnknownSource(String),

    #[error("Unknown submission: {0}")]
    UnknownSubmission(i64),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(i64),

    #[error("Unknown review item: {0}")]
    UnknownReviewItem(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Ledger post failed: {0}")]
    Ledger(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, MatchbookError>;
