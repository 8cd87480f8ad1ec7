use std::path::Path;

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::error::{MatchbookError, Result};
use crate::fmt::parse_amount_cents;
use crate::store;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn parse_date_mdy(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    chrono::NaiveDate::from_ymd_opt(y, m, d).map(|dt| dt.format("%Y-%m-%d").to_string())
}

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

const VENDOR_PREFIXES: &[&str] = &["PURCHASE ", "POS ", "DEBIT ", "ACH ", "CHECKCARD "];

/// Best-effort vendor name from a raw bank description: strip processor
/// prefixes, keep the first few words, drop trailing reference digits.
pub fn extract_vendor(description: &str) -> Option<String> {
    let mut desc = description.trim().to_string();
    let upper = desc.to_uppercase();
    for prefix in VENDOR_PREFIXES {
        if upper.starts_with(prefix) {
            desc = desc[prefix.len()..].to_string();
            break;
        }
    }
    let words: Vec<&str> = desc.split_whitespace().take(3).collect();
    let vendor = words
        .join(" ")
        .trim_matches(|c: char| c.is_ascii_digit() || c == '*' || c == '#')
        .trim()
        .to_string();
    if vendor.is_empty() {
        None
    } else {
        Some(vendor)
    }
}

// ---------------------------------------------------------------------------
// Feed kinds — enum dispatch instead of trait objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ParsedTxn {
    pub date: String,
    pub description: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedKind {
    Amex,
    WellsFargo,
}

impl FeedKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Amex => "amex",
            Self::WellsFargo => "wells_fargo",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Amex => "American Express",
            Self::WellsFargo => "Wells Fargo",
        }
    }

    pub fn detect(&self, file_path: &Path) -> bool {
        match self {
            Self::Amex => detect_amex(file_path),
            Self::WellsFargo => detect_wells_fargo(file_path),
        }
    }

    pub fn parse(&self, file_path: &Path) -> Result<Vec<ParsedTxn>> {
        match self {
            Self::Amex => parse_amex(file_path),
            Self::WellsFargo => parse_wells_fargo(file_path),
        }
    }
}

const ALL_FEEDS: &[FeedKind] = &[FeedKind::Amex, FeedKind::WellsFargo];

pub fn get_by_key(key: &str) -> Option<FeedKind> {
    ALL_FEEDS.iter().find(|f| f.key() == key).copied()
}

pub fn detect_feed(file_path: &Path) -> Option<FeedKind> {
    ALL_FEEDS.iter().find(|f| f.detect(file_path)).copied()
}

// ---------------------------------------------------------------------------
// import_file
// ---------------------------------------------------------------------------

pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub duplicate_file: bool,
}

pub fn import_file(
    conn: &Connection,
    file_path: &Path,
    source_key: Option<&str>,
) -> Result<ImportResult> {
    let feed = if let Some(key) = source_key {
        get_by_key(key).ok_or_else(|| MatchbookError::UnknownSource(key.to_string()))?
    } else {
        detect_feed(file_path).ok_or_else(|| {
            MatchbookError::UnknownSource(file_path.display().to_string())
        })?
    };

    let checksum = compute_checksum(file_path)?;
    {
        let mut stmt =
            conn.prepare("SELECT 1 FROM imports WHERE checksum = ?1 AND source = ?2")?;
        if stmt.exists(rusqlite::params![checksum, feed.key()])? {
            return Ok(ImportResult {
                imported: 0,
                skipped: 0,
                duplicate_file: true,
            });
        }
    }

    let parsed = feed.parse(file_path)?;

    let dates: Vec<&str> = parsed.iter().map(|r| r.date.as_str()).collect();
    let min_date = dates.iter().min().copied();
    let max_date = dates.iter().max().copied();
    conn.execute(
        "INSERT INTO imports (filename, source, record_count, date_range_start, date_range_end, checksum) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            file_path.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            feed.key(),
            parsed.len() as i64,
            min_date,
            max_date,
            checksum,
        ],
    )?;
    let import_id = conn.last_insert_rowid();

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for row in &parsed {
        let vendor = extract_vendor(&row.description);
        let inserted = store::insert_transaction(
            conn,
            feed.key(),
            &row.date,
            &row.description,
            row.amount_cents,
            vendor.as_deref(),
            Some(import_id),
        )?;
        if inserted.is_some() {
            imported += 1;
        } else {
            skipped += 1;
        }
    }

    Ok(ImportResult {
        imported,
        skipped,
        duplicate_file: false,
    })
}

// ---------------------------------------------------------------------------
// Amex parser
// ---------------------------------------------------------------------------

fn detect_amex(file_path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(file_path) else {
        return false;
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if record.len() >= 3 && record[0].trim() == "Date" && record[1].contains("Description") {
            return true;
        }
    }
    false
}

/// Amex statement export: header row then Date,Description,Amount.
/// Charges are positive in the feed; credits come through negative and are
/// kept as-is so refunds stay visible.
fn parse_amex(file_path: &Path) -> Result<Vec<ParsedTxn>> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut rows = Vec::new();
    let mut found_header = false;

    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if !found_header {
            if record.len() >= 3 && record[0].trim() == "Date" && record[1].contains("Description") {
                found_header = true;
            }
            continue;
        }
        if record.len() < 3 || record[0].trim().is_empty() {
            continue;
        }
        let Some(date) = parse_date_mdy(&record[0]) else {
            continue;
        };
        let description = record[1].trim().to_string();
        if description.is_empty() {
            continue;
        }
        let Some(amount_cents) = parse_amount_cents(&record[2]) else {
            continue;
        };
        rows.push(ParsedTxn {
            date,
            description,
            amount_cents,
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Wells Fargo parser
// ---------------------------------------------------------------------------

fn detect_wells_fargo(file_path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(file_path) else {
        return false;
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    // Headerless five-column layout: Date, Amount, *, blank, Description
    if let Some(Ok(record)) = rdr.records().next() {
        return record.len() == 5
            && parse_date_mdy(&record[0]).is_some()
            && record[2].trim() == "*";
    }
    false
}

/// Wells Fargo export: headerless, debits negative. Amounts are negated so a
/// card charge lands positive like the Amex feed.
fn parse_wells_fargo(file_path: &Path) -> Result<Vec<ParsedTxn>> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut rows = Vec::new();

    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if record.len() < 5 {
            continue;
        }
        let Some(date) = parse_date_mdy(&record[0]) else {
            continue;
        };
        let Some(amount_cents) = parse_amount_cents(&record[1]) else {
            continue;
        };
        let description = record[4].trim().to_string();
        if description.is_empty() {
            continue;
        }
        rows.push(ParsedTxn {
            date,
            description,
            amount_cents: -amount_cents,
        });
    }
    Ok(rows)
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

    fn write_amex_csv(dir: &Path, name: &str, rows: &[(&str, &str, &str)]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut content = String::from("Date,Description,Amount\n");
        for (date, desc, amt) in rows {
            content.push_str(&format!("{date},{desc},{amt}\n"));
        }
        std::fs::write(&path, &content).unwrap();
        path
    }

    #[test]
    fn test_parse_date_mdy() {
        assert_eq!(parse_date_mdy("01/15/2025"), Some("2025-01-15".to_string()));
        assert_eq!(parse_date_mdy("12/01/2024"), Some("2024-12-01".to_string()));
        assert_eq!(parse_date_mdy("invalid"), None);
        assert_eq!(parse_date_mdy("2025-01-15"), None);
        assert_eq!(parse_date_mdy("13/01/2025"), None);
        assert_eq!(parse_date_mdy("02/30/2025"), None);
    }

    #[test]
    fn test_extract_vendor_strips_prefixes() {
        assert_eq!(
            extract_vendor("PURCHASE CHEVRON 0093 HOUSTON TX").as_deref(),
            Some("CHEVRON 0093 HOUSTON")
        );
        assert_eq!(extract_vendor("POS WALMART #1234").as_deref(), Some("WALMART"));
        assert_eq!(
            extract_vendor("CHECKCARD DELTA AIR 0062341").as_deref(),
            Some("DELTA AIR")
        );
        assert_eq!(extract_vendor("   ").as_deref(), None);
    }

    #[test]
    fn test_import_amex_inserts_transactions() {
        let (dir, conn) = test_db();
        let csv_path = write_amex_csv(
            dir.path(),
            "stmt.csv",
            &[
                ("03/10/2025", "CHEVRON 0093 HOUSTON TX", "45.00"),
                ("03/11/2025", "MARRIOTT AUSTIN", "312.88"),
                ("03/12/2025", "PAYMENT RECEIVED - THANK YOU", "-500.00"),
            ],
        );
        let result = import_file(&conn, &csv_path, Some("amex")).unwrap();
        assert_eq!(result.imported, 3);
        assert!(!result.duplicate_file);

        let (amount, vendor): (i64, Option<String>) = conn
            .query_row(
                "SELECT amount_cents, extracted_vendor FROM bank_transactions WHERE description LIKE 'CHEVRON%'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(amount, 4500);
        assert_eq!(vendor.as_deref(), Some("CHEVRON 0093 HOUSTON"));
    }

    #[test]
    fn test_import_detects_duplicate_file() {
        let (dir, conn) = test_db();
        let csv_path = write_amex_csv(dir.path(), "stmt.csv", &[("03/10/2025", "CHEVRON", "45.00")]);
        let r1 = import_file(&conn, &csv_path, Some("amex")).unwrap();
        assert_eq!(r1.imported, 1);
        let r2 = import_file(&conn, &csv_path, Some("amex")).unwrap();
        assert!(r2.duplicate_file);
        assert_eq!(r2.imported, 0);
    }

    #[test]
    fn test_import_skips_duplicate_rows() {
        let (dir, conn) = test_db();
        let csv1 = write_amex_csv(
            dir.path(),
            "stmt1.csv",
            &[("03/10/2025", "CHEVRON", "45.00"), ("03/11/2025", "MARRIOTT", "312.88")],
        );
        import_file(&conn, &csv1, Some("amex")).unwrap();
        let csv2 = write_amex_csv(
            dir.path(),
            "stmt2.csv",
            &[("03/11/2025", "MARRIOTT", "312.88"), ("03/12/2025", "DELTA", "188.20")],
        );
        let r2 = import_file(&conn, &csv2, Some("amex")).unwrap();
        assert_eq!(r2.imported, 1);
        assert_eq!(r2.skipped, 1);
    }

    #[test]
    fn test_wells_fargo_parse_negates_debits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.csv");
        let content = "\
\"03/10/2025\",\"-45.00\",\"*\",\"\",\"PURCHASE CHEVRON 0093 HOUSTON TX\"
\"03/11/2025\",\"-12.50\",\"*\",\"\",\"POS STARBUCKS STORE 112\"
";
        std::fs::write(&path, content).unwrap();
        let rows = FeedKind::WellsFargo.parse(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount_cents, 4500);
        assert_eq!(rows[1].amount_cents, 1250);
    }

    #[test]
    fn test_detect_feed() {
        let dir = tempfile::tempdir().unwrap();
        let amex = write_amex_csv(dir.path(), "a.csv", &[("03/10/2025", "CHEVRON", "45.00")]);
        assert_eq!(detect_feed(&amex), Some(FeedKind::Amex));

        let wf = dir.path().join("wf.csv");
        std::fs::write(&wf, "\"03/10/2025\",\"-45.00\",\"*\",\"\",\"CHEVRON\"\n").unwrap();
        assert_eq!(detect_feed(&wf), Some(FeedKind::WellsFargo));
    }

    #[test]
    fn test_unknown_source_key_errors() {
        let (dir, conn) = test_db();
        let csv_path = write_amex_csv(dir.path(), "stmt.csv", &[("03/10/2025", "CHEVRON", "45.00")]);
        assert!(import_file(&conn, &csv_path, Some("citibank")).is_err());
    }
}
