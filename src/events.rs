use chrono::NaiveDate;
use rusqlite::Connection;

use crate::error::{MatchbookError, Result};

/// Days either side of an event's run during which an expense still counts as
/// incurred at the venue (travel days, early arrivals).
const EVENT_BUFFER_DAYS: i64 = 2;

#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub state: String,
    pub starts_on: String,
    pub ends_on: String,
}

pub fn add_event(
    conn: &Connection,
    name: &str,
    state: &str,
    starts_on: &str,
    ends_on: &str,
) -> Result<i64> {
    let start = NaiveDate::parse_from_str(starts_on, "%Y-%m-%d")
        .map_err(|_| MatchbookError::InvalidInput(format!("unparseable date '{starts_on}'")))?;
    let end = NaiveDate::parse_from_str(ends_on, "%Y-%m-%d")
        .map_err(|_| MatchbookError::InvalidInput(format!("unparseable date '{ends_on}'")))?;
    if end < start {
        return Err(MatchbookError::InvalidInput(format!(
            "event ends before it starts: {starts_on}..{ends_on}"
        )));
    }
    conn.execute(
        "INSERT INTO events (name, state, starts_on, ends_on) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![name, state.to_uppercase(), starts_on, ends_on],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_events(conn: &Connection) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, state, starts_on, ends_on FROM events ORDER BY starts_on",
    )?;
    let events = stmt
        .query_map([], |row| {
            Ok(Event {
                id: row.get(0)?,
                name: row.get(1)?,
                state: row.get(2)?,
                starts_on: row.get(3)?,
                ends_on: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(events)
}

/// The venue state for an expense date, if an event was running then
/// (buffered by travel days). When several events overlap the earliest-
/// starting one wins.
pub fn venue_for_date(conn: &Connection, date: NaiveDate) -> Result<Option<Event>> {
    let day = date.to_string();
    let buffer = format!("{EVENT_BUFFER_DAYS} days");
    let mut stmt = conn.prepare(
        "SELECT id, name, state, starts_on, ends_on FROM events \
         WHERE date(?1) BETWEEN date(starts_on, '-' || ?2) AND date(ends_on, '+' || ?2) \
         ORDER BY starts_on",
    )?;
    let hits: Vec<Event> = stmt
        .query_map(rusqlite::params![day, buffer], |row| {
            Ok(Event {
                id: row.get(0)?,
                name: row.get(1)?,
                state: row.get(2)?,
                starts_on: row.get(3)?,
                ends_on: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(hits.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_venue_within_event_dates() {
        let (_dir, conn) = test_db();
        add_event(&conn, "Houston Workshop", "TX", "2025-03-10", "2025-03-12").unwrap();
        let event = venue_for_date(&conn, d("2025-03-11")).unwrap().unwrap();
        assert_eq!(event.state, "TX");
    }

    #[test]
    fn test_venue_buffer_covers_travel_days() {
        let (_dir, conn) = test_db();
        add_event(&conn, "Houston Workshop", "TX", "2025-03-10", "2025-03-12").unwrap();
        assert!(venue_for_date(&conn, d("2025-03-08")).unwrap().is_some());
        assert!(venue_for_date(&conn, d("2025-03-14")).unwrap().is_some());
        assert!(venue_for_date(&conn, d("2025-03-07")).unwrap().is_none());
        assert!(venue_for_date(&conn, d("2025-03-15")).unwrap().is_none());
    }

    #[test]
    fn test_earliest_event_wins_overlap() {
        let (_dir, conn) = test_db();
        add_event(&conn, "Houston Workshop", "TX", "2025-03-10", "2025-03-12").unwrap();
        add_event(&conn, "Denver Course", "CO", "2025-03-11", "2025-03-13").unwrap();
        let event = venue_for_date(&conn, d("2025-03-11")).unwrap().unwrap();
        assert_eq!(event.state, "TX");
    }

    #[test]
    fn test_add_event_validates_dates() {
        let (_dir, conn) = test_db();
        assert!(add_event(&conn, "Bad", "TX", "2025-03-12", "2025-03-10").is_err());
        assert!(add_event(&conn, "Bad", "TX", "03/10/2025", "2025-03-12").is_err());
    }

    #[test]
    fn test_state_stored_uppercased() {
        let (_dir, conn) = test_db();
        add_event(&conn, "Houston Workshop", "tx", "2025-03-10", "2025-03-12").unwrap();
        let events = list_events(&conn).unwrap();
        assert_eq!(events[0].state, "TX");
    }
}
