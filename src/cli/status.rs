use crate::db::get_connection;
use crate::error::Result;
use crate::settings::{db_path, load_settings};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Outbox:     {}", settings.ledger_outbox_path().display());
    println!("Threshold:  {}", settings.scoring.auto_post_threshold);

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `matchbook init` to set up.");
        return Ok(());
    }
    let conn = get_connection(&db_path)?;

    let transactions: i64 =
        conn.query_row("SELECT count(*) FROM bank_transactions", [], |r| r.get(0))?;
    let unmatched: i64 = conn.query_row(
        "SELECT count(*) FROM bank_transactions WHERE status = 'unmatched'",
        [],
        |r| r.get(0),
    )?;
    let submissions: i64 = conn.query_row("SELECT count(*) FROM submissions", [], |r| r.get(0))?;
    let pending: i64 = conn.query_row(
        "SELECT count(*) FROM submissions WHERE status = 'pending'",
        [],
        |r| r.get(0),
    )?;
    let flagged: i64 = conn.query_row(
        "SELECT count(*) FROM submissions WHERE status = 'flagged'",
        [],
        |r| r.get(0),
    )?;
    let posted: i64 = conn.query_row(
        "SELECT count(*) FROM submissions WHERE status IN ('posted', 'corrected')",
        [],
        |r| r.get(0),
    )?;
    let rules: i64 = conn.query_row("SELECT count(*) FROM vendor_rules", [], |r| r.get(0))?;
    let open_errors: i64 = conn.query_row(
        "SELECT count(*) FROM processing_errors WHERE status IN ('new', 'investigating')",
        [],
        |r| r.get(0),
    )?;

    println!();
    println!("Transactions:  {transactions} ({unmatched} unmatched)");
    println!("Submissions:   {submissions} ({pending} pending, {flagged} in review, {posted} posted)");
    println!("Vendor rules:  {rules}");
    println!("Open errors:   {open_errors}");
    Ok(())
}
