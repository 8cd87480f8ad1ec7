use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::Result;
use crate::events;
use crate::settings::db_path;

pub fn add(name: &str, state: &str, starts: &str, ends: &str) -> Result<()> {
    let conn = get_connection(&db_path())?;
    events::add_event(&conn, name, state, starts, ends)?;
    println!("Added event: {name} ({state}, {starts}..{ends})");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let events = events::list_events(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "State", "Starts", "Ends"]);
    for event in events {
        table.add_row(vec![
            Cell::new(event.id),
            Cell::new(&event.name),
            Cell::new(&event.state),
            Cell::new(&event.starts_on),
            Cell::new(&event.ends_on),
        ]);
    }
    println!("Events\n{table}");
    Ok(())
}
