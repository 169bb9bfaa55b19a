//! `reel`: sync, browse and resolve a streaming catalog from the command line.

mod app;
mod commands;
mod error;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use exn::ResultExt;
use reel_config::Config;
use reel_source::models::Category;
use tracing::error;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::app::App;
use crate::error::{ErrorKind, Result};

#[derive(Debug, Parser)]
#[command(name = "reel", version, about = "Streaming catalog sync and playback resolution")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file; replaces the one found in the platform config directory.
    #[arg(long, global = true, env = "REEL_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog database; overrides `database.path`.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Walk upstream catalog listings and reconcile them into the local catalog
    Sync {
        /// Sources to sync; every configured source when omitted
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Fetch and reconcile without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Print one page of the local catalog, newest first
    Page {
        #[arg(long)]
        source: Option<String>,
        /// `movie` or `series`
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..=200))]
        page_size: u32,
    },
    /// Full-text search over the local catalog
    Search {
        query: String,
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Turn a content page into playable stream candidates, best first
    Resolve {
        url: Url,
        #[arg(long)]
        source: Option<String>,
    },
    /// Print persisted source and mirror health
    Health,
}

fn parse_category(value: &str) -> std::result::Result<Category, String> {
    value.parse().map_err(|error: reel_source::error::Error| error.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(error) => {
            error!(error = ?error, retryable = error.is_retryable(), "command failed");
            ExitCode::FAILURE
        },
    }
}

/// `Ok(false)` means the command ran but did not fully succeed: a sync left
/// sections incomplete or a resolve found nothing playable.
async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }
    let dry_run = matches!(cli.command, Command::Sync { dry_run: true, .. });
    let app = App::open(config, dry_run).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let outcome = match &cli.command {
        Command::Sync { sources, .. } => commands::sync(&app, sources, &mut out).await,
        Command::Page {
            source,
            category,
            page,
            page_size,
        } => commands::page(&app, source.as_deref(), *category, *page, *page_size, &mut out).await.map(|_| true),
        Command::Search { query, source, limit } => {
            commands::search(&app, source.as_deref(), query, *limit, &mut out).await.map(|_| true)
        },
        Command::Resolve { url, source } => commands::resolve(&app, source.as_deref(), url, &mut out).await,
        Command::Health => commands::health(&app, &mut out).map(|_| true),
    };
    out.flush().or_raise(|| ErrorKind::Output)?;
    app.close().await?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn arguments_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_takes_several_sources() {
        let cli = Cli::try_parse_from(["reel", "sync", "--source", "a", "--source", "b", "--dry-run"]).unwrap();
        let Command::Sync { sources, dry_run } = cli.command else {
            panic!("expected sync, got {:?}", cli.command);
        };
        assert_eq!(sources, ["a", "b"]);
        assert!(dry_run);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["reel", "health", "--database", "/tmp/catalog.db"]).unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/catalog.db")));
        assert!(matches!(cli.command, Command::Health));
    }

    #[rstest]
    #[case(&["reel", "page", "--category", "tv"], true)]
    #[case(&["reel", "page", "--category", "documentary"], false)]
    #[case(&["reel", "page", "--page", "0"], false)]
    #[case(&["reel", "page", "--page-size", "500"], false)]
    #[case(&["reel", "resolve", "not a url"], false)]
    #[case(&["reel", "resolve", "https://site.example.com/movies/dune/"], true)]
    #[case(&["reel", "search"], false)]
    fn validates_arguments(#[case] args: &[&str], #[case] valid: bool) {
        assert_eq!(Cli::try_parse_from(args).is_ok(), valid);
    }
}
