use std::path::PathBuf;

use crate::db::get_connection;
use crate::error::Result;
use crate::importer::import_file;
use crate::settings::db_path;

pub fn run(file: &str, source: Option<&str>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let result = import_file(&conn, &PathBuf::from(file), source)?;

    if result.duplicate_file {
        println!("This file has already been imported (duplicate checksum).");
        return Ok(());
    }
    println!("{} imported, {} skipped (duplicates)", result.imported, result.skipped);
    Ok(())
}
