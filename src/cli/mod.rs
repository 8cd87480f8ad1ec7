pub mod audit;
pub mod demo;
pub mod events;
pub mod import;
pub mod ingest;
pub mod init;
pub mod process;
pub mod queue;
pub mod receipt;
pub mod recover;
pub mod review;
pub mod rules;
pub mod status;
pub mod sweep;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "matchbook",
    about = "Reconcile corporate-card transactions against expense submissions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up matchbook: choose a data directory and initialize the database.
    Init {
        /// Path for matchbook data (default: ~/Documents/matchbook)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import a bank CSV feed.
    Import {
        /// Path to the CSV export
        file: String,
        /// Feed key (amex, wells_fargo); auto-detected when omitted
        #[arg(long)]
        source: Option<String>,
    },
    /// Ingest an expense report (JSON) from the expense system.
    Ingest {
        /// Path to the report payload
        file: String,
    },
    /// Record a receipt OCR extraction against a submission.
    Receipt {
        /// Submission id
        submission: i64,
        /// Extracted amount, e.g. 45.00
        #[arg(long)]
        amount: String,
        /// Extraction confidence 0-100
        #[arg(long)]
        confidence: i64,
    },
    /// Run the matcher over pending submissions.
    Process {
        /// Process a single submission instead of everything pending
        #[arg(long)]
        id: Option<i64>,
    },
    /// Sweep unmatched transactions past the grace period.
    Sweep {
        /// Treat this date as today (YYYY-MM-DD); defaults to the local date
        #[arg(long = "as-of")]
        as_of: Option<String>,
    },
    /// Reset submissions stranded by an interrupted run.
    Recover,
    /// List the review queue.
    Queue {
        /// Filter: reimbursement, low_confidence, flagged, orphan, processing_error
        #[arg(long)]
        kind: Option<String>,
    },
    /// Apply a review decision to a queue item.
    Review {
        /// Item handle from the queue listing (S-12, T-4, E-9)
        item: String,
        /// approve, correct-approve, reject, reimburse, resubmit, exclude,
        /// resolve-orphan, create-rule, retry, investigate, resolve, ignore
        action: String,
        #[arg(long)]
        category: Option<String>,
        /// State override, e.g. TX or "California - CA"
        #[arg(long)]
        state: Option<String>,
        /// Amount override, e.g. 45.00
        #[arg(long)]
        amount: Option<String>,
        /// Transaction id override for correct-approve
        #[arg(long)]
        transaction: Option<i64>,
        /// Reimbursement method (check, payroll)
        #[arg(long)]
        method: Option<String>,
        /// Vendor pattern for create-rule
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Manage vendor rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Manage the event calendar consulted for state attribution.
    Events {
        #[command(subcommand)]
        command: EventsCommands,
    },
    /// Cross-check ledger postings against store statuses.
    Audit,
    /// Show current database and summary statistics.
    Status,
    /// Load sample data (transactions, submissions, rules) to explore matchbook.
    Demo,
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add or update a vendor rule.
    Add {
        /// Vendor pattern (matched as a lower-cased substring)
        pattern: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value_t = 70)]
        confidence: i64,
        /// Higher priority rules are consulted first
        #[arg(long)]
        priority: Option<i64>,
        /// Matching strategy: contains (default), starts_with, or regex
        #[arg(long = "match-type")]
        match_type: Option<String>,
    },
    /// List vendor rules.
    List,
}

#[derive(Subcommand)]
pub enum EventsCommands {
    /// Add an event to the calendar.
    Add {
        /// Event name
        name: String,
        /// Venue state, e.g. TX
        #[arg(long)]
        state: String,
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        starts: String,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        ends: String,
    },
    /// List events.
    List,
}
