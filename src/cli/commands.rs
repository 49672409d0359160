//! CLI commands implementation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;

use crate::browser::BrowserSession;
use crate::config::Settings;
use crate::repository::ArchiveRepository;
use crate::walker::PageWalker;

#[derive(Parser)]
#[command(name = "wilson")]
#[command(about = "Wilson Center Digital Archive acquisition tool")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file path (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a range of search-results pages into the database
    Scrape {
        /// Starting page number (0-indexed)
        #[arg(long, default_value = "0")]
        start_page: u32,
        /// Ending page number, inclusive (default: the full archive)
        #[arg(long)]
        end_page: Option<u32>,
        /// Only mark pages complete when every document on them succeeded
        #[arg(long)]
        strict_completion: bool,
    },

    /// Export all scraped documents to a CSV file
    Export {
        /// Output file
        #[arg(short, long, default_value = "wilson_archive.csv")]
        output: PathBuf,
    },

    /// Show database statistics
    Stats,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    match cli.command {
        Commands::Scrape {
            start_page,
            end_page,
            strict_completion,
        } => {
            if strict_completion {
                settings.strict_completion = true;
            }
            cmd_scrape(&settings, start_page, end_page).await
        }
        Commands::Export { output } => cmd_export(&settings, &output),
        Commands::Stats => cmd_stats(&settings),
    }
}

/// Scrape a page range, resuming past completed pages.
async fn cmd_scrape(settings: &Settings, start: u32, end: Option<u32>) -> anyhow::Result<()> {
    let end = end.unwrap_or(settings.last_page);
    if end < start {
        anyhow::bail!("end page {} is before start page {}", end, start);
    }

    let repo = ArchiveRepository::open(&settings.db_path)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!(
                    "\n{} Interrupt received, finishing the current page...",
                    style("!").yellow()
                );
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let session = BrowserSession::new(settings.browser.clone());
    let mut walker = PageWalker::new(session, settings.clone(), shutdown);
    walker.scrape_range(&repo, start, end).await?;

    print_stats(&repo)?;
    Ok(())
}

/// Export the database to CSV.
fn cmd_export(settings: &Settings, output: &Path) -> anyhow::Result<()> {
    let repo = ArchiveRepository::open(&settings.db_path)?;
    let count = repo.export_to_csv(output)?;

    if count == 0 {
        println!("{} No documents found in database", style("!").yellow());
    } else {
        println!(
            "{} Exported {} documents to {}",
            style("✓").green(),
            count,
            output.display()
        );
    }
    Ok(())
}

/// Print database statistics.
fn cmd_stats(settings: &Settings) -> anyhow::Result<()> {
    let repo = ArchiveRepository::open(&settings.db_path)?;
    print_stats(&repo)
}

fn print_stats(repo: &ArchiveRepository) -> anyhow::Result<()> {
    let stats = repo.stats()?;
    println!("\nDatabase Statistics:");
    println!(
        "  Documents scraped: {}",
        style(stats.document_count).cyan()
    );
    println!("  Pages completed:   {}", style(stats.page_count).cyan());
    Ok(())
}
