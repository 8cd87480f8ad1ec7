use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::{MatchbookError, Result};
use crate::fmt::money;
use crate::queue::{list, ItemKind};
use crate::settings::{db_path, load_settings};

pub fn run(kind: Option<&str>) -> Result<()> {
    let filter = match kind {
        Some(raw) => Some(ItemKind::parse(raw).ok_or_else(|| {
            MatchbookError::InvalidInput(format!("unknown queue kind '{raw}'"))
        })?),
        None => None,
    };

    let settings = load_settings();
    let conn = get_connection(&db_path())?;
    let items = list(&conn, &settings, filter)?;

    if items.is_empty() {
        println!("Review queue is empty.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Ref", "Type", "Date", "Vendor", "Amount", "Detail", "Actions"]);
    for item in &items {
        table.add_row(vec![
            Cell::new(item.item_ref()),
            Cell::new(item.kind().as_str()),
            Cell::new(item.date().unwrap_or("-")),
            Cell::new(item.vendor().unwrap_or("-")),
            Cell::new(item.amount_cents().map(money).unwrap_or_else(|| "-".to_string())),
            Cell::new(item.summary()),
            Cell::new(item.allowed_actions().join(", ")),
        ]);
    }
    println!("Review queue ({} items)\n{table}", items.len());
    Ok(())
}
