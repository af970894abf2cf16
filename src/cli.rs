use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::list::ListOptions;
use crate::commands::process::ProcessOptions;
use crate::commands::show::ShowOptions;
use crate::commands::sync::SyncOptions;
use crate::commands::{self, CommandReport};
use crate::granola::pipeline::Selection;

#[derive(Parser)]
#[command(
    name = "granola-sync",
    version,
    about = "Sync Granola meeting transcripts into an Obsidian vault"
)]
pub struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Materialise new cache entries as transcript notes
    Sync {
        #[arg(long)]
        dry_run: bool,
    },
    /// List transcripts waiting for processing
    List {
        #[arg(long)]
        older_than_hours: Option<u64>,
    },
    /// Extract action items and route updates for unprocessed transcripts
    Process {
        /// Transcript file name (with or without .md) or path
        #[arg(long, conflicts_with_all = ["all", "auto"])]
        file: Option<String>,
        /// Every unprocessed transcript. Same as passing no selector.
        #[arg(long, conflicts_with = "auto")]
        all: bool,
        /// Only transcripts older than the configured auto-process age
        #[arg(long)]
        auto: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print one transcript's header and body
    Show { file: String },
    /// Resolved paths, config, cache and provider state
    Status,
}

fn selection(file: Option<String>, auto: bool) -> Selection {
    match file {
        Some(file) => Selection::File(file),
        None if auto => Selection::Auto,
        None => Selection::All,
    }
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}: {}", report.command, if report.ok { "ok" } else { "issues" });
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = match cli.command {
        Command::Sync { dry_run } => commands::sync::run(&SyncOptions { dry_run })?,
        Command::List { older_than_hours } => {
            commands::list::run(&ListOptions { older_than_hours })?
        }
        Command::Process {
            file,
            auto,
            dry_run,
            ..
        } => commands::process::run(&ProcessOptions {
            selection: selection(file, auto),
            dry_run,
        })?,
        Command::Show { file } => commands::show::run(&ShowOptions { file })?,
        Command::Status => commands::status::run()?,
    };

    render(&report, cli.json)?;
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
