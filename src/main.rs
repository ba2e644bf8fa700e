//! Command-line entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trackwatch::engine::Extractor;
use trackwatch::{enrich, fetch, media, site, store};

#[derive(Parser)]
#[command(
    name = "trackwatch",
    version,
    about = "Scrape and watch weekly community track listings"
)]
struct Cli {
    /// Listing site root
    #[arg(long, default_value = site::BASE_URL)]
    base_url: String,

    /// Upper bound on listing pages fetched per run
    #[arg(long, default_value_t = 50)]
    max_pages: u32,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 15)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a user's current track listing
    Tracks {
        user: String,
        /// Emit the raw record array as JSON
        #[arg(long)]
        json: bool,
    },
    /// Diff comment counts against the record file, then update it
    Watch {
        user: String,
        /// Path of the JSON record store
        #[arg(long)]
        record: PathBuf,
    },
    /// Download a user's audio files, with descriptions and tags
    Download {
        user: String,
        /// Output directory
        #[arg(long, default_value = "tracks")]
        out: PathBuf,
        /// Maximum in-flight fetches
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        /// Leave downloaded files untagged
        #[arg(long)]
        skip_tags: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trackwatch=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let client = fetch::ListingClient::new(&cli.base_url, cli.timeout)?;
    let extractor = Extractor::new(site::watch_config());

    match cli.command {
        Command::Tracks { user, json } => {
            let tracks = fetch::collect_tracks(&client, &extractor, &user, cli.max_pages)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tracks)?);
            } else {
                for track in &tracks {
                    let week = track
                        .int_field("week")
                        .map_or_else(|| "??".to_string(), |w| format!("{w:02}"));
                    println!(
                        "week {week}  {}  ({} comments)",
                        track.str_field("title").unwrap_or("<untitled>"),
                        track.int_field("comments").unwrap_or(0),
                    );
                }
            }
        }
        Command::Watch { user, record } => {
            let tracks = fetch::collect_tracks(&client, &extractor, &user, cli.max_pages)?;
            let previous = store::load_records(&record)?;
            let deltas = store::new_comments(&tracks, &previous);
            store::save_records(&record, &tracks)?;
            if deltas.is_empty() {
                println!("no new comments");
            } else {
                for (week, delta) in deltas {
                    println!("Week {week}: {delta:+} comments");
                }
            }
        }
        Command::Download {
            user,
            out,
            concurrency,
            skip_tags,
        } => {
            let mut tracks = fetch::collect_tracks(&client, &extractor, &user, cli.max_pages)?;
            let timeout = Duration::from_secs(cli.timeout);
            let runtime = tokio::runtime::Runtime::new().context("tokio runtime")?;
            runtime.block_on(async {
                let enriched =
                    enrich::enrich_records(&mut tracks, &cli.base_url, concurrency, timeout)
                        .await?;
                tracing::info!(enriched, total = tracks.len(), "descriptions fetched");
                let written =
                    media::download_tracks(&tracks, &out, concurrency, timeout, !skip_tags).await?;
                println!(
                    "downloaded {written} of {} tracks to {}",
                    tracks.len(),
                    out.display()
                );
                anyhow::Ok(())
            })?;
        }
    }
    Ok(())
}
