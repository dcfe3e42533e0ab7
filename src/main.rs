//! # Histify CLI (`histify`)
//!
//! ## Usage
//!
//! ```bash
//! histify --config ./config/histify.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `histify analyze <image>` | Tag and summarize a photo, save it to history |
//! | `histify tags <image>` | Only generate tags |
//! | `histify describe "<text>"` | Summarize from a text description of an image |
//! | `histify validate --summary "<text>"` | Check that a summary is about a concrete historic subject |
//! | `histify history` | List, filter, or clear recent analyses |
//! | `histify serve` | Start the JSON HTTP API |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;

use histify::analyze::{AnalysisOutcome, Analyzer};
use histify::config::{self, Config};
use histify::flows::extended_summary::generate_extended_summary;
use histify::flows::tags::generate_tags;
use histify::flows::validation::validate_relevance;
use histify::history::{suggest_tags, HistoryQuery, SortOrder};
use histify::image::ImageInput;
use histify::models::{AnalysisRecord, SummaryResult};
use histify::{logging, server};

const DEFAULT_CONFIG: &str = "./config/histify.toml";

/// Histify — find the history in your photos.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, `./config/histify.toml` is used if present, and
/// built-in defaults (model provider disabled) otherwise.
#[derive(Parser)]
#[command(
    name = "histify",
    about = "Histify — tags and historical summaries for photos via structured model calls",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a photo: tags, then summaries; the result is saved to history.
    Analyze {
        /// Path to the image file.
        image: PathBuf,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate up to four tags for a photo.
    Tags {
        /// Path to the image file.
        image: PathBuf,
    },

    /// Generate a summary from a text description of an image.
    Describe {
        /// Description of the image content.
        description: String,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check whether a short summary discusses a location, architecture,
    /// statue, or artifact.
    ///
    /// Without `--historical` no model call is made.
    Validate {
        /// The short summary to check.
        #[arg(long)]
        summary: String,

        /// Treat the summary as coming from a historical classification.
        #[arg(long)]
        historical: bool,
    },

    /// Show recent analyses.
    History {
        /// Only show entries with a tag containing this text (case-insensitive).
        #[arg(long)]
        tag: Option<String>,

        /// Sort order: `newest` or `oldest`.
        #[arg(long, default_value = "newest")]
        sort: SortOrder,

        /// List tag suggestions instead of entries.
        #[arg(long)]
        tags: bool,

        /// Remove all entries.
        #[arg(long)]
        clear: bool,

        /// Print entries as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the JSON HTTP API.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => {
            warn!("no config file found at {}; using defaults", DEFAULT_CONFIG);
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("histify=info");
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze { image, json } => {
            let analyzer = Analyzer::from_config(&cfg)?;
            let outcome = match ImageInput::from_path(&image) {
                Ok(image) => analyzer.analyze(&image).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(outcome) if json => println!("{}", serde_json::to_string_pretty(&outcome)?),
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => {
                    eprintln!("{}", e.user_notice());
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Tags { image } => {
            let analyzer = Analyzer::from_config(&cfg)?;
            let image = ImageInput::from_path(&image)?;
            let tags = generate_tags(analyzer.backend(), &image).await?;
            if tags.is_empty() {
                println!("(no tags)");
            }
            for tag in tags.iter() {
                println!("{}", tag);
            }
        }
        Commands::Describe { description, json } => {
            let analyzer = Analyzer::from_config(&cfg)?;
            let summary = generate_extended_summary(analyzer.backend(), &description).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::Validate {
            summary,
            historical,
        } => {
            let analyzer = Analyzer::from_config(&cfg)?;
            let result = validate_relevance(analyzer.backend(), &summary, historical).await?;
            println!("valid:     {}", result.is_valid);
            println!("summary:   {}", result.validated_summary);
        }
        Commands::History {
            tag,
            sort,
            tags,
            clear,
            json,
        } => {
            let analyzer = Analyzer::from_config(&cfg)?;
            let history = analyzer.history();
            if clear {
                history.clear().await?;
                println!("History cleared.");
                return Ok(());
            }

            let entries = history.entries().await?;
            if tags {
                for t in suggest_tags(&entries, tag.as_deref().unwrap_or("")) {
                    println!("{}", t);
                }
                return Ok(());
            }

            let items = HistoryQuery { tag, sort }.apply(&entries);
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                if entries.is_empty() {
                    println!("No history items yet.");
                } else {
                    println!("No results match your filters.");
                }
            } else {
                for item in &items {
                    print_history_item(item);
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn print_summary(summary: &SummaryResult) {
    println!("historical:    {}", summary.is_historical);
    println!("short summary: {}", summary.short_summary);
    if !summary.long_summary.is_empty() {
        println!();
        println!("{}", summary.long_summary);
    }
}

fn print_outcome(outcome: &AnalysisOutcome) {
    let r = &outcome.result;
    println!("--- Analysis ---");
    println!("id:            {}", r.id);
    println!("date:          {}", r.analysis_date);
    println!("tags:          {}", r.tags.join(", "));
    print_summary(&SummaryResult {
        short_summary: r.short_summary.clone(),
        long_summary: r.long_summary.clone().unwrap_or_default(),
        is_historical: r.is_historical,
    });
    if let Some(ref warning) = outcome.history_warning {
        eprintln!("{}", warning);
    }
}

fn print_history_item(item: &AnalysisRecord) {
    println!("--- Analysis from: {} ---", item.analysis_date);
    println!("id:         {}", item.id);
    if item.tags.is_empty() {
        println!("tags:       (none)");
    } else {
        println!("tags:       {}", item.tags.join(", "));
    }
    println!("historical: {}", item.is_historical);
    println!("summary:    {}", item.short_summary);
}
