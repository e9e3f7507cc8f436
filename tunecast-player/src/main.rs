//! Tunecast - command-line front-end
//!
//! Exercises the resolution pipeline without a voice transport: classify
//! an input, resolve it to playable tracks, or list the filter catalog.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunecast_common::config::{resolve_config_path, LoggingConfig, TomlConfig};
use tunecast_player::batch::{BatchCoordinator, BatchObserver, PairResolver};
use tunecast_player::cache::ResolutionCache;
use tunecast_player::classify::Classification;
use tunecast_player::media::{GenericMediaResolver, LinkResolution, TrackRef, YtDlpProvider};
use tunecast_player::normalize::sanitize;
use tunecast_player::playback::AudioFilter;
use tunecast_player::sources::{canonicalize, HttpFetcher, PageFetcher, PlatformRegistry};

/// Command-line arguments for tunecast
#[derive(Parser, Debug)]
#[command(name = "tunecast")]
#[command(about = "Music link resolution and playback queue engine")]
#[command(version)]
struct Args {
    /// Configuration file (overrides TUNECAST_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show how an input would be routed
    Classify { input: String },
    /// Resolve an input to playable tracks
    Resolve { query: String },
    /// List available audio filters
    Filters,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;
    match resolve_config_path(args.config.as_deref()) {
        Some(path) => info!(path = %path.display(), "Configuration source"),
        None => warn!("No configuration file, running with built-in defaults"),
    }

    match args.command {
        Command::Classify { input } => classify(&config, &input, args.json).await,
        Command::Resolve { query } => resolve(&config, &query, args.json).await,
        Command::Filters => {
            for filter in AudioFilter::ALL {
                println!("{:<10} {}", filter.name(), filter.expression());
            }
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("tunecast_player={0},tunecast_common={0}", logging.level).into()
        }),
    );

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

fn fetcher(config: &TomlConfig) -> Result<Arc<dyn PageFetcher>> {
    let fetcher = HttpFetcher::new(&config.resolver.user_agent, config.resolver.extraction_timeout())
        .context("Failed to build HTTP client")?;
    Ok(Arc::new(fetcher))
}

async fn classify(config: &TomlConfig, input: &str, json: bool) -> Result<()> {
    let fetcher = fetcher(config)?;
    let classification = canonicalize(&sanitize(input), fetcher.as_ref())
        .await
        .context("Failed to expand share link")?;

    let (route, target) = match &classification {
        Classification::Catalog { platform, url } => (format!("catalog ({})", platform), url.clone()),
        Classification::Media { host, url } => (format!("media ({:?})", host), url.clone()),
        Classification::Search(term) => ("search".to_string(), term.clone()),
        Classification::ShareLink { platform, url } => (format!("share link ({})", platform), url.clone()),
    };
    if json {
        println!("{}", serde_json::json!({ "route": route, "target": target }));
    } else {
        println!("{}: {}", route, target);
    }
    Ok(())
}

async fn resolve(config: &TomlConfig, query: &str, json: bool) -> Result<()> {
    let query = sanitize(query);
    anyhow::ensure!(!query.is_empty(), "empty query");

    let fetcher = fetcher(config)?;
    let provider = Arc::new(YtDlpProvider::new(config.resolver.ytdlp_path.clone()));
    let media = Arc::new(GenericMediaResolver::new(provider, &config.resolver));
    let platforms = PlatformRegistry::standard(config, fetcher.clone())
        .context("Failed to initialize platform resolvers")?;
    let printer = Printer { json };

    match canonicalize(&query, fetcher.as_ref()).await? {
        Classification::Catalog { platform, url } => {
            let pairs = platforms.resolve(platform, &url).await?;
            info!(platform = %platform, count = pairs.len(), "Catalog collection resolved");

            let cache = Arc::new(ResolutionCache::new(config.cache.max_entries, config.cache.ttl()));
            let batch = BatchCoordinator::new(PairResolver::new(cache, media), &config.batch);
            let cancel = CancellationToken::new();

            let report = tokio::select! {
                report = batch.run(pairs, &printer, &cancel) => report?,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    anyhow::bail!("interrupted");
                }
            };
            eprintln!(
                "{} of {} resolved, {} failed",
                report.succeeded, report.total, report.failed
            );
            for failure in &report.failures {
                eprintln!("  not found: {}", failure);
            }
        }
        Classification::Media { url, .. } => match media.resolve_link(&url).await? {
            LinkResolution::Single(track) => printer.print(&track),
            LinkResolution::Collection { title, tracks } => {
                if let Some(title) = title {
                    eprintln!("{} ({} tracks)", title, tracks.len());
                }
                for track in &tracks {
                    printer.print(track);
                }
            }
        },
        Classification::Search(term) => printer.print(&media.search(&term).await?),
        Classification::ShareLink { url, .. } => anyhow::bail!("unresolved share link {}", url),
    }
    Ok(())
}

struct Printer {
    json: bool,
}

impl Printer {
    fn print(&self, track: &TrackRef) {
        if self.json {
            match serde_json::to_string(track) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "Failed to serialize track"),
            }
        } else {
            println!("{}  <{}>", track.title, track.url);
        }
    }
}

#[async_trait]
impl BatchObserver for Printer {
    async fn on_resolved(&self, track: TrackRef) {
        self.print(&track);
    }

    async fn on_progress(&self, processed: usize, total: usize) {
        eprintln!("[{}/{}]", processed, total);
    }
}
