use colored::Colorize;

use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::money;
use crate::ledger::OutboxLedger;
use crate::matcher::{self, Disposition};
use crate::settings::{db_path, load_settings};
use crate::store;

fn describe(submission_id: i64, disposition: &Disposition) -> String {
    match disposition {
        Disposition::AutoPosted {
            posted_id,
            confidence,
            state,
            ..
        } => format!(
            "{} submission {submission_id}: posted {posted_id} ({state}, confidence {confidence})",
            "auto".green()
        ),
        Disposition::Flagged {
            kind,
            reason,
            confidence,
        } => format!(
            "{} submission {submission_id}: {} (confidence {confidence}) - {reason}",
            "review".yellow(),
            kind.as_str()
        ),
        Disposition::LedgerFailed { message } => format!(
            "{} submission {submission_id}: ledger post failed - {message}",
            "error".red()
        ),
        Disposition::Skipped { status } => {
            format!("submission {submission_id}: skipped ({})", status.as_str())
        }
    }
}

pub fn run(id: Option<i64>) -> Result<()> {
    let settings = load_settings();
    let conn = get_connection(&db_path())?;
    let ledger = OutboxLedger::new(settings.ledger_outbox_path());

    match id {
        Some(id) => {
            let submission = store::get_submission(&conn, id)?;
            let disposition = matcher::process_submission(&conn, &ledger, &settings, id)?;
            println!("{} ({})", describe(id, &disposition), money(submission.amount_cents));
        }
        None => {
            let outcomes = matcher::process_pending(&conn, &ledger, &settings)?;
            if outcomes.is_empty() {
                println!("Nothing pending.");
                return Ok(());
            }
            for (submission_id, disposition) in &outcomes {
                println!("{}", describe(*submission_id, disposition));
            }
        }
    }
    Ok(())
}
