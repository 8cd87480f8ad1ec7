use chrono::{Local, NaiveDate};

use crate::db::get_connection;
use crate::error::{MatchbookError, Result};
use crate::ledger::OutboxLedger;
use crate::orphans;
use crate::settings::{db_path, load_settings};

pub fn run(as_of: Option<&str>) -> Result<()> {
    let today = match as_of {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| MatchbookError::InvalidInput(format!("unparseable date '{raw}'")))?,
        None => Local::now().date_naive(),
    };

    let settings = load_settings();
    let conn = get_connection(&db_path())?;
    let ledger = OutboxLedger::new(settings.ledger_outbox_path());

    let result = orphans::sweep(&conn, &ledger, &settings, today)?;
    println!(
        "{} examined: {} auto-posted, {} queued for review, {} errors",
        result.examined, result.processed, result.queued, result.errors
    );
    Ok(())
}
