use chrono::NaiveDate;
use rusqlite::Connection;

use crate::error::Result;
use crate::events;
use crate::rules;

pub const UNKNOWN_STATE: &str = "Unknown";

/// Which tier of the attribution waterfall produced the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSource {
    Tag,
    Event,
    VendorRule,
    Human,
    Unknown,
}

impl StateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Event => "event",
            Self::VendorRule => "vendor_rule",
            Self::Human => "human",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateDecision {
    pub state: String,
    pub source: StateSource,
}

impl StateDecision {
    pub fn unknown() -> Self {
        Self {
            state: UNKNOWN_STATE.to_string(),
            source: StateSource::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        self.source != StateSource::Unknown
    }
}

// Full state names the expense system's tags spell out.
const STATE_NAMES: &[(&str, &str)] = &[
    ("CALIFORNIA", "CA"),
    ("TEXAS", "TX"),
    ("COLORADO", "CO"),
    ("WASHINGTON", "WA"),
    ("NEW JERSEY", "NJ"),
    ("FLORIDA", "FL"),
    ("MONTANA", "MT"),
    ("NORTH CAROLINA", "NC"),
];

/// Extract a two-letter state code from an expense-system tag such as
/// "California - CA", "Texas", or a bare "TX". The "Other" tag books to NC,
/// the admin/home-office default.
pub fn state_from_tag(tag: &str) -> Option<String> {
    let tag_upper = tag.trim().to_uppercase();
    if tag_upper.is_empty() {
        return None;
    }
    if tag_upper == "OTHER" {
        return Some("NC".to_string());
    }

    // "State Name - XX" format: trust the explicit suffix.
    if let Some((_, code)) = tag_upper.split_once(" - ") {
        let code = code.trim();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Some(code.to_string());
        }
    }

    for (name, code) in STATE_NAMES {
        if tag_upper.contains(name) {
            return Some((*code).to_string());
        }
    }

    if tag_upper.len() == 2 && tag_upper.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(tag_upper);
    }

    None
}

/// Normalize a human-entered state override: accepts a bare code or a full
/// name; anything else is rejected upstream as invalid input.
pub fn normalize_state(raw: &str) -> Option<String> {
    state_from_tag(raw)
}

/// The attribution waterfall. Tiers in strict priority order; the first one
/// that produces a state wins.
pub fn determine_state(
    conn: &Connection,
    state_tag: Option<&str>,
    expense_date: NaiveDate,
    vendor: Option<&str>,
) -> Result<StateDecision> {
    // (a) Explicit tag from the expense system.
    if let Some(state) = state_tag.and_then(state_from_tag) {
        return Ok(StateDecision {
            state,
            source: StateSource::Tag,
        });
    }

    // (b) Event calendar: where was the team on that date?
    if let Some(event) = events::venue_for_date(conn, expense_date)? {
        return Ok(StateDecision {
            state: event.state,
            source: StateSource::Event,
        });
    }

    // (c) Vendor rule default.
    if let Some(vendor) = vendor {
        if let Some(rule) = rules::find_rule(conn, vendor)? {
            if let Some(state) = rule.state {
                rules::record_use(conn, rule.id)?;
                return Ok(StateDecision {
                    state,
                    source: StateSource::VendorRule,
                });
            }
        }
    }

    // (d) Nothing left to consult.
    Ok(StateDecision::unknown())
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
    fn test_state_from_tag_formats() {
        assert_eq!(state_from_tag("California - CA").as_deref(), Some("CA"));
        assert_eq!(state_from_tag("Texas").as_deref(), Some("TX"));
        assert_eq!(state_from_tag("TX").as_deref(), Some("TX"));
        assert_eq!(state_from_tag("tx").as_deref(), Some("TX"));
        assert_eq!(state_from_tag("Other").as_deref(), Some("NC"));
        assert_eq!(state_from_tag("New Jersey - NJ").as_deref(), Some("NJ"));
        assert_eq!(state_from_tag(""), None);
        assert_eq!(state_from_tag("Quarterly travel"), None);
    }

    #[test]
    fn test_explicit_tag_wins_over_vendor_rule() {
        let (_dir, conn) = test_db();
        rules::upsert(&conn, "chevron", None, Some("CA"), 80).unwrap();
        let decision =
            determine_state(&conn, Some("Texas - TX"), d("2025-03-10"), Some("CHEVRON")).unwrap();
        assert_eq!(decision.state, "TX");
        assert_eq!(decision.source, StateSource::Tag);
    }

    #[test]
    fn test_event_wins_over_vendor_rule() {
        let (_dir, conn) = test_db();
        events::add_event(&conn, "Denver Course", "CO", "2025-03-09", "2025-03-12").unwrap();
        rules::upsert(&conn, "chevron", None, Some("CA"), 80).unwrap();
        let decision = determine_state(&conn, None, d("2025-03-10"), Some("CHEVRON")).unwrap();
        assert_eq!(decision.state, "CO");
        assert_eq!(decision.source, StateSource::Event);
    }

    #[test]
    fn test_vendor_rule_fallback() {
        let (_dir, conn) = test_db();
        rules::upsert(&conn, "chevron", None, Some("CA"), 80).unwrap();
        let decision = determine_state(&conn, None, d("2025-03-10"), Some("CHEVRON 0093")).unwrap();
        assert_eq!(decision.state, "CA");
        assert_eq!(decision.source, StateSource::VendorRule);
    }

    #[test]
    fn test_rule_without_state_falls_through_to_unknown() {
        let (_dir, conn) = test_db();
        rules::upsert(&conn, "walmart", Some("Supplies"), None, 80).unwrap();
        let decision = determine_state(&conn, None, d("2025-03-10"), Some("WALMART 881")).unwrap();
        assert_eq!(decision.state, UNKNOWN_STATE);
        assert!(!decision.is_known());
    }

    #[test]
    fn test_unknown_when_nothing_matches() {
        let (_dir, conn) = test_db();
        let decision = determine_state(&conn, None, d("2025-03-10"), None).unwrap();
        assert_eq!(decision.state, UNKNOWN_STATE);
        assert_eq!(decision.source, StateSource::Unknown);
    }
}
