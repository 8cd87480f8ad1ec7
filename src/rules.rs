use regex::Regex;
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::VendorRule;

/// Confidence ceiling for learned rules; only a human-set value goes higher.
const LEARNED_CONFIDENCE_CAP: i64 = 95;
const LEARNED_CONFIDENCE_START: i64 = 70;
const CONFIRMATION_BUMP: i64 = 5;

fn matches(vendor_text: &str, pattern: &str, match_type: &str) -> bool {
    let text_upper = vendor_text.to_uppercase();
    let pat_upper = pattern.to_uppercase();
    match match_type {
        "contains" => text_upper.contains(&pat_upper),
        "starts_with" => text_upper.starts_with(&pat_upper),
        "regex" => Regex::new(pattern)
            .map(|re| re.is_match(vendor_text))
            .unwrap_or(false),
        _ => false,
    }
}

pub fn list_rules(conn: &Connection) -> Result<Vec<VendorRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, pattern, match_type, category, state, confidence, priority, hit_count \
         FROM vendor_rules ORDER BY priority DESC, id",
    )?;
    let rules = stmt
        .query_map([], |row| {
            Ok(VendorRule {
                id: row.get(0)?,
                pattern: row.get(1)?,
                match_type: row.get(2)?,
                category: row.get(3)?,
                state: row.get(4)?,
                confidence: row.get(5)?,
                priority: row.get(6)?,
                hit_count: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rules)
}

/// First matching rule wins, scanning in priority order. There is no
/// specificity ranking: a short generic pattern at equal priority shadows a
/// longer one, and priorities are the escape hatch.
pub fn find_rule(conn: &Connection, vendor_text: &str) -> Result<Option<VendorRule>> {
    for rule in list_rules(conn)? {
        if matches(vendor_text, &rule.pattern, &rule.match_type) {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}

/// Record that a rule drove a decision: bump usage counters.
pub fn record_use(conn: &Connection, rule_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE vendor_rules SET hit_count = hit_count + 1, last_matched_at = datetime('now') \
         WHERE id = ?1",
        [rule_id],
    )?;
    Ok(())
}

/// Upsert keyed on the lower-cased pattern.
pub fn upsert(
    conn: &Connection,
    pattern: &str,
    category: Option<&str>,
    state: Option<&str>,
    confidence: i64,
) -> Result<()> {
    let pattern = pattern.trim().to_lowercase();
    conn.execute(
        "INSERT INTO vendor_rules (pattern, category, state, confidence) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(pattern) DO UPDATE SET \
             category = COALESCE(excluded.category, category), \
             state = COALESCE(excluded.state, state), \
             confidence = excluded.confidence",
        rusqlite::params![pattern, category, state, confidence],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Learning loop
// ---------------------------------------------------------------------------

/// A human approved the prediction as-is: the rule that produced it gains
/// confidence, up to the learned cap.
pub fn learn_confirmation(conn: &Connection, vendor_text: &str) -> Result<()> {
    if let Some(rule) = find_rule(conn, vendor_text)? {
        let bumped = (rule.confidence + CONFIRMATION_BUMP).min(LEARNED_CONFIDENCE_CAP);
        conn.execute(
            "UPDATE vendor_rules SET confidence = ?2, hit_count = hit_count + 1, \
             last_matched_at = datetime('now') WHERE id = ?1",
            rusqlite::params![rule.id, bumped],
        )?;
    }
    Ok(())
}

/// A human overrode the prediction: the vendor's rule takes the human's final
/// values as its new defaults, at moderate confidence.
pub fn learn_correction(
    conn: &Connection,
    vendor: &str,
    category: Option<&str>,
    state: Option<&str>,
) -> Result<()> {
    let pattern = vendor.trim().to_lowercase();
    if pattern.is_empty() {
        return Ok(());
    }
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM vendor_rules WHERE pattern = ?1",
            [&pattern],
            |r| r.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE vendor_rules SET \
                     category = COALESCE(?2, category), \
                     state = COALESCE(?3, state), \
                     confidence = ?4, \
                     last_matched_at = datetime('now') \
                 WHERE id = ?1",
                rusqlite::params![id, category, state, LEARNED_CONFIDENCE_START],
            )?;
        }
        None => {
            upsert(conn, &pattern, category, state, LEARNED_CONFIDENCE_START)?;
        }
    }
    Ok(())
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

    fn add_rule(conn: &Connection, pattern: &str, state: Option<&str>, priority: i64) {
        conn.execute(
            "INSERT INTO vendor_rules (pattern, category, state, priority) VALUES (?1, 'Fuel', ?2, ?3)",
            rusqlite::params![pattern, state, priority],
        )
        .unwrap();
    }

    #[test]
    fn test_contains_match_is_case_insensitive() {
        let (_dir, conn) = test_db();
        add_rule(&conn, "chevron", Some("TX"), 0);
        let rule = find_rule(&conn, "CHEVRON 0093 HOUSTON").unwrap().unwrap();
        assert_eq!(rule.pattern, "chevron");
        assert_eq!(rule.state.as_deref(), Some("TX"));
    }

    #[test]
    fn test_first_match_wins_by_priority() {
        let (_dir, conn) = test_db();
        add_rule(&conn, "chevron houston", Some("TX"), 0);
        add_rule(&conn, "chevron", Some("CA"), 10);
        // The generic pattern has higher priority, so it shadows the
        // more specific one — first-match semantics, no specificity ranking.
        let rule = find_rule(&conn, "CHEVRON HOUSTON").unwrap().unwrap();
        assert_eq!(rule.state.as_deref(), Some("CA"));
    }

    #[test]
    fn test_insertion_order_breaks_priority_ties() {
        let (_dir, conn) = test_db();
        add_rule(&conn, "walmart", Some("NC"), 0);
        add_rule(&conn, "walmart supercenter", Some("TX"), 0);
        let rule = find_rule(&conn, "WALMART SUPERCENTER 881").unwrap().unwrap();
        assert_eq!(rule.state.as_deref(), Some("NC"));
    }

    #[test]
    fn test_starts_with_and_regex_strategies() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO vendor_rules (pattern, match_type, state) VALUES ('shell', 'starts_with', 'TX')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO vendor_rules (pattern, match_type, state) VALUES ('^UBER\\s+TRIP', 'regex', 'CA')",
            [],
        )
        .unwrap();

        assert!(find_rule(&conn, "SHELL OIL 557").unwrap().is_some());
        assert!(find_rule(&conn, "ROYAL SHELL").unwrap().is_none());
        let uber = find_rule(&conn, "UBER TRIP 88M2").unwrap().unwrap();
        assert_eq!(uber.state.as_deref(), Some("CA"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let (_dir, conn) = test_db();
        add_rule(&conn, "chevron", Some("TX"), 0);
        assert!(find_rule(&conn, "DELTA AIR LINES").unwrap().is_none());
    }

    #[test]
    fn test_upsert_is_keyed_on_lowercased_pattern() {
        let (_dir, conn) = test_db();
        upsert(&conn, "Chevron", Some("Fuel"), Some("TX"), 70).unwrap();
        upsert(&conn, "CHEVRON", None, Some("CA"), 80).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM vendor_rules", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let (category, state, confidence): (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT category, state, confidence FROM vendor_rules WHERE pattern = 'chevron'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        // Upsert keeps the old category when the new one is absent.
        assert_eq!(category.as_deref(), Some("Fuel"));
        assert_eq!(state.as_deref(), Some("CA"));
        assert_eq!(confidence, 80);
    }

    #[test]
    fn test_learn_confirmation_bumps_to_cap() {
        let (_dir, conn) = test_db();
        upsert(&conn, "chevron", Some("Fuel"), Some("TX"), 92).unwrap();
        learn_confirmation(&conn, "CHEVRON HOUSTON").unwrap();
        let (confidence, hits): (i64, i64) = conn
            .query_row(
                "SELECT confidence, hit_count FROM vendor_rules WHERE pattern = 'chevron'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(confidence, 95);
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_learn_correction_overwrites_defaults() {
        let (_dir, conn) = test_db();
        upsert(&conn, "chevron", Some("Fuel"), Some("TX"), 90).unwrap();
        learn_correction(&conn, "Chevron", Some("Travel"), Some("CA")).unwrap();
        let (category, state, confidence): (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT category, state, confidence FROM vendor_rules WHERE pattern = 'chevron'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(category.as_deref(), Some("Travel"));
        assert_eq!(state.as_deref(), Some("CA"));
        assert_eq!(confidence, LEARNED_CONFIDENCE_START);
    }

    #[test]
    fn test_learn_correction_creates_rule_for_new_vendor() {
        let (_dir, conn) = test_db();
        learn_correction(&conn, "Blue Bottle", Some("Meals"), None).unwrap();
        let rule = find_rule(&conn, "BLUE BOTTLE COFFEE OAK").unwrap().unwrap();
        assert_eq!(rule.category.as_deref(), Some("Meals"));
        assert_eq!(rule.state, None);
    }

    #[test]
    fn test_record_use_increments() {
        let (_dir, conn) = test_db();
        add_rule(&conn, "chevron", Some("TX"), 0);
        let rule = find_rule(&conn, "CHEVRON").unwrap().unwrap();
        record_use(&conn, rule.id).unwrap();
        record_use(&conn, rule.id).unwrap();
        let hits: i64 = conn
            .query_row("SELECT hit_count FROM vendor_rules WHERE id = ?1", [rule.id], |r| r.get(0))
            .unwrap();
        assert_eq!(hits, 2);
    }
}
