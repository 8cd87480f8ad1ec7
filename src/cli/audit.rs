use colored::Colorize;

use crate::db::get_connection;
use crate::error::Result;
use crate::ledger::audit;
use crate::settings::db_path;

pub fn run() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let report = audit(&conn)?;

    if report.is_clean() {
        println!("{} postings and statuses agree", "clean".green());
        return Ok(());
    }
    if !report.marked_not_posted.is_empty() {
        println!("{}", "Marked but not posted:".red());
        for line in &report.marked_not_posted {
            println!("  {line}");
        }
    }
    if !report.posted_not_marked.is_empty() {
        println!("{}", "Posted but not marked:".red());
        for line in &report.posted_not_marked {
            println!("  {line}");
        }
    }
    Ok(())
}
