use crate::db::get_connection;
use crate::error::Result;
use crate::orphans::recover_stuck;
use crate::settings::db_path;

pub fn run() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let result = recover_stuck(&conn)?;
    println!(
        "{} reset for retry, {} flagged for review",
        result.recovered, result.flagged
    );
    Ok(())
}
