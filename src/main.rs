mod actions;
mod cli;
mod corrections;
mod db;
mod error;
mod events;
mod fmt;
mod importer;
mod ingest;
mod ledger;
mod matcher;
mod models;
mod orphans;
mod policy;
mod queue;
mod receipt;
mod rules;
mod settings;
mod states;
mod store;

use clap::Parser;

use cli::{Cli, Commands, EventsCommands, RulesCommands};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import { file, source } => cli::import::run(&file, source.as_deref()),
        Commands::Ingest { file } => cli::ingest::run(&file),
        Commands::Receipt {
            submission,
            amount,
            confidence,
        } => cli::receipt::run(submission, &amount, confidence),
        Commands::Process { id } => cli::process::run(id),
        Commands::Sweep { as_of } => cli::sweep::run(as_of.as_deref()),
        Commands::Recover => cli::recover::run(),
        Commands::Queue { kind } => cli::queue::run(kind.as_deref()),
        Commands::Review {
            item,
            action,
            category,
            state,
            amount,
            transaction,
            method,
            pattern,
        } => cli::review::run(
            &item,
            &action,
            category.as_deref(),
            state.as_deref(),
            amount.as_deref(),
            transaction,
            method.as_deref(),
            pattern.as_deref(),
        ),
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                pattern,
                category,
                state,
                confidence,
                priority,
                match_type,
            } => cli::rules::add(
                &pattern,
                category.as_deref(),
                state.as_deref(),
                confidence,
                priority,
                match_type.as_deref(),
            ),
            RulesCommands::List => cli::rules::list(),
        },
        Commands::Events { command } => match command {
            EventsCommands::Add {
                name,
                state,
                starts,
                ends,
            } => cli::events::add(&name, &state, &starts, &ends),
            EventsCommands::List => cli::events::list(),
        },
        Commands::Audit => cli::audit::run(),
        Commands::Status => cli::status::run(),
        Commands::Demo => cli::demo::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
