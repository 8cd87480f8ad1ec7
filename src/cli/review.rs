use colored::Colorize;

use crate::actions::{execute, parse_item_ref, Overrides};
use crate::db::get_connection;
use crate::error::{MatchbookError, Result};
use crate::fmt::parse_amount_cents;
use crate::ledger::OutboxLedger;
use crate::settings::{db_path, load_settings};

#[allow(clippy::too_many_arguments)]
pub fn run(
    item: &str,
    action: &str,
    category: Option<&str>,
    state: Option<&str>,
    amount: Option<&str>,
    transaction: Option<i64>,
    method: Option<&str>,
    pattern: Option<&str>,
) -> Result<()> {
    let amount_cents = match amount {
        Some(raw) => Some(parse_amount_cents(raw).ok_or_else(|| {
            MatchbookError::InvalidInput(format!("unparseable amount '{raw}'"))
        })?),
        None => None,
    };
    let overrides = Overrides {
        category: category.map(|s| s.to_string()),
        state: state.map(|s| s.to_string()),
        amount_cents,
        transaction_id: transaction,
        method: method.map(|s| s.to_string()),
        pattern: pattern.map(|s| s.to_string()),
    };

    let settings = load_settings();
    let conn = get_connection(&db_path())?;
    let ledger = OutboxLedger::new(settings.ledger_outbox_path());
    let item_ref = parse_item_ref(item)?;

    let outcome = execute(&conn, &ledger, &settings, item_ref, action, &overrides)?;
    if outcome.success {
        println!("{} {}", "ok".green(), outcome.message);
    } else {
        println!("{} {}", "refused".red(), outcome.message);
    }
    Ok(())
}
