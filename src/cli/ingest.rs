use std::path::PathBuf;

use colored::Colorize;

use crate::db::get_connection;
use crate::error::Result;
use crate::ingest::ingest_report_file;
use crate::settings::db_path;

pub fn run(file: &str) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let result = ingest_report_file(&conn, &PathBuf::from(file))?;

    println!(
        "{} ingested, {} duplicates skipped",
        result.ingested, result.duplicates
    );
    if !result.errors.is_empty() {
        println!("{}", format!("{} rejected:", result.errors.len()).red());
        for error in &result.errors {
            println!("  {}: {}", error.external_id, error.message);
        }
    }
    Ok(())
}
