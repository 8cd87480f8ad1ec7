use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::{MatchbookError, Result};
use crate::rules;
use crate::settings::db_path;

pub fn add(
    pattern: &str,
    category: Option<&str>,
    state: Option<&str>,
    confidence: i64,
    priority: Option<i64>,
    match_type: Option<&str>,
) -> Result<()> {
    if let Some(mt) = match_type {
        if !["contains", "starts_with", "regex"].contains(&mt) {
            return Err(MatchbookError::InvalidInput(format!(
                "unknown match type '{mt}' (expected contains, starts_with, or regex)"
            )));
        }
    }
    let conn = get_connection(&db_path())?;
    rules::upsert(&conn, pattern, category, state, confidence)?;
    if let Some(priority) = priority {
        conn.execute(
            "UPDATE vendor_rules SET priority = ?2 WHERE pattern = ?1",
            rusqlite::params![pattern.trim().to_lowercase(), priority],
        )?;
    }
    if let Some(match_type) = match_type {
        conn.execute(
            "UPDATE vendor_rules SET match_type = ?2 WHERE pattern = ?1",
            rusqlite::params![pattern.trim().to_lowercase(), match_type],
        )?;
    }
    println!(
        "Saved rule: '{}' \u{2192} {} / {}",
        pattern.to_lowercase(),
        category.unwrap_or("(keep category)"),
        state.unwrap_or("(any state)")
    );
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let rules = rules::list_rules(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Pattern", "Type", "Category", "State", "Confidence", "Priority", "Hits"]);
    for rule in rules {
        table.add_row(vec![
            Cell::new(rule.id),
            Cell::new(&rule.pattern),
            Cell::new(&rule.match_type),
            Cell::new(rule.category.as_deref().unwrap_or("-")),
            Cell::new(rule.state.as_deref().unwrap_or("any")),
            Cell::new(rule.confidence),
            Cell::new(rule.priority),
            Cell::new(rule.hit_count),
        ]);
    }
    println!("Vendor rules\n{table}");
    Ok(())
}
