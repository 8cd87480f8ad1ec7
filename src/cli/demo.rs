use chrono::{Duration, Local, NaiveDate};
use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::Result;
use crate::ingest::{ingest_report, Report, ReportExpense};
use crate::ledger::OutboxLedger;
use crate::matcher;
use crate::orphans;
use crate::rules;
use crate::settings::{db_path, load_settings};
use crate::store;

const DEMO_REPORT_ID: &str = "ER-DEMO-1";

// (days ago, description, amount cents)
const CHARGES: &[(i64, &str, i64)] = &[
    (9, "CHEVRON 0093 HOUSTON TX", 4500),
    (9, "MARRIOTT AUSTIN DOWNTOWN", 31288),
    (8, "BISTRO 44 AUSTIN", 6550),
    (12, "DELTA AIR 0062341215", 38820),
    (15, "WALMART SUPERCENTER 881", 6423),
    (20, "AMAZON MKTPL*HG42K", 2999),
];

// (external id, days ago, amount cents, vendor, category, state tag)
struct DemoExpense {
    external_id: &'static str,
    days_ago: i64,
    amount_cents: i64,
    vendor: &'static str,
    category: &'static str,
    state_tag: Option<&'static str>,
}

const EXPENSES: &[DemoExpense] = &[
    // Exact match with a tag: auto-posts.
    DemoExpense {
        external_id: "z-demo-1",
        days_ago: 9,
        amount_cents: 4500,
        vendor: "Chevron",
        category: "Fuel",
        state_tag: Some("Texas - TX"),
    },
    // Within tolerance but not exact: lands in review.
    DemoExpense {
        external_id: "z-demo-2",
        days_ago: 8,
        amount_cents: 6480,
        vendor: "Bistro 44",
        category: "Meals",
        state_tag: Some("Texas - TX"),
    },
    // No card counterpart: reimbursement candidate.
    DemoExpense {
        external_id: "z-demo-3",
        days_ago: 7,
        amount_cents: 1850,
        vendor: "Yellow Cab",
        category: "Travel",
        state_tag: Some("Texas - TX"),
    },
    // Exact match, no tag and no rule: state unknown, forced review.
    DemoExpense {
        external_id: "z-demo-4",
        days_ago: 12,
        amount_cents: 38820,
        vendor: "Delta Air",
        category: "Travel",
        state_tag: None,
    },
];

fn days_ago(n: i64) -> NaiveDate {
    Local::now().date_naive() - Duration::days(n)
}

fn insert_demo_data(conn: &Connection) -> Result<()> {
    for (ago, description, amount_cents) in CHARGES {
        store::insert_transaction(
            conn,
            "amex",
            &days_ago(*ago).to_string(),
            description,
            *amount_cents,
            crate::importer::extract_vendor(description).as_deref(),
            None,
        )?;
    }

    // Rules: one fully resolving (sweeps the Amazon orphan), one without a
    // state default (queues the Walmart orphan).
    rules::upsert(conn, "amazon", Some("Supplies"), Some("NC"), 80)?;
    rules::upsert(conn, "walmart", Some("Supplies"), None, 80)?;

    let report = Report {
        report_id: DEMO_REPORT_ID.to_string(),
        submitter: Some("demo".to_string()),
        expenses: EXPENSES
            .iter()
            .map(|e| ReportExpense {
                external_id: e.external_id.to_string(),
                date: days_ago(e.days_ago).to_string(),
                amount: format!("{}.{:02}", e.amount_cents / 100, e.amount_cents % 100),
                vendor: Some(e.vendor.to_string()),
                category: Some(e.category.to_string()),
                state_tag: e.state_tag.map(|s| s.to_string()),
                receipt_ref: None,
            })
            .collect(),
    };
    ingest_report(conn, &report)?;
    Ok(())
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = db_path();
    if !db_path.exists() {
        eprintln!("No database found. Run `matchbook init` first.");
        std::process::exit(1);
    }
    let conn = get_connection(&db_path)?;

    // Idempotency guard
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM submissions WHERE report_id = ?1)",
        [DEMO_REPORT_ID],
        |r| r.get(0),
    )?;
    if exists {
        println!("Demo data already loaded (report '{DEMO_REPORT_ID}' exists).");
        return Ok(());
    }

    insert_demo_data(&conn)?;

    let ledger = OutboxLedger::new(settings.ledger_outbox_path());
    let outcomes = matcher::process_pending(&conn, &ledger, &settings)?;
    let sweep = orphans::sweep(&conn, &ledger, &settings, Local::now().date_naive())?;

    println!("Demo data loaded!");
    println!("  Bank charges:  {}", CHARGES.len());
    println!("  Submissions:   {} processed", outcomes.len());
    println!("  Orphan sweep:  {} auto-posted, {} queued", sweep.processed, sweep.queued);
    println!();
    println!("Try these next:");
    println!("  matchbook queue");
    println!("  matchbook review S-2 approve");
    println!("  matchbook status");
    println!("  matchbook audit");
    Ok(())
}
