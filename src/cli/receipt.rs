use crate::db::get_connection;
use crate::error::{MatchbookError, Result};
use crate::fmt::parse_amount_cents;
use crate::receipt::record_extraction;
use crate::settings::db_path;

pub fn run(submission: i64, amount: &str, confidence: i64) -> Result<()> {
    let amount_cents = parse_amount_cents(amount)
        .ok_or_else(|| MatchbookError::InvalidInput(format!("unparseable amount '{amount}'")))?;
    let conn = get_connection(&db_path())?;
    record_extraction(&conn, submission, amount_cents, confidence)?;
    println!("Recorded extraction for submission {submission}: {amount} at {confidence}%");
    Ok(())
}
