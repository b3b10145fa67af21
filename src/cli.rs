//! Command-line interface definitions for Global News Digest.
//!
//! This module defines the subcommands using the `clap` crate. All settings
//! live in [`Settings`] and can be provided via flags or environment
//! variables (including a `.env` file).

use crate::config::Settings;
use crate::models::Category;
use clap::{Parser, Subcommand};

/// Command-line arguments for the Global News Digest application.
///
/// # Examples
///
/// ```sh
/// # Fetch, summarize and email today's digest once
/// global_news_digest run
///
/// # Write and email the AI × finance evening read
/// global_news_digest article
///
/// # Inspect what the feeds return, without calling the model
/// global_news_digest fetch --categories finance,crypto
///
/// # Expose /trigger over HTTP
/// TRIGGER_SECRET_KEY=s3cret global_news_digest serve
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub settings: Settings,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch all feeds, summarize them and email the digest
    Run,
    /// Fetch finance and tech feeds and email one analysis article
    Article,
    /// Fetch feeds and print the brief (or JSON) without summarizing
    Fetch {
        /// Comma-separated categories to fetch (default: all)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<Category>,

        /// Print the deduplicated buckets as JSON instead of the brief
        #[arg(long)]
        json: bool,
    },
    /// Serve `/`, `/health` and `/trigger` over HTTP
    Serve,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["global_news_digest", "run"]);
        assert_eq!(cli.command, Command::Run);
    }

    #[test]
    fn test_fetch_categories() {
        let cli = Cli::parse_from(["global_news_digest", "fetch", "--categories", "finance,Crypto", "--json"]);
        assert_eq!(
            cli.command,
            Command::Fetch {
                categories: vec![Category::Finance, Category::Crypto],
                json: true
            }
        );
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        assert!(Cli::try_parse_from(["global_news_digest", "fetch", "--categories", "sports"]).is_err());
    }

    #[test]
    fn test_settings_flags_before_subcommand() {
        let cli = Cli::parse_from(["global_news_digest", "--rss-max-workers", "4", "serve"]);
        assert_eq!(cli.command, Command::Serve);
        assert_eq!(cli.settings.rss_max_workers, 4);
    }
}
