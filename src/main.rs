//! clipfeed CLI
//!
//! Usage:
//!   clipfeed replay session.json            # Replay a scripted feed session
//!   clipfeed replay session.json -c 5       # ...with a 5 message limit
//!   clipfeed config                         # Print the effective config

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

use clipfeed::FeedConfig;
use clipfeed::export::{DirectoryDownloads, DownloadSink, MemoryDownloads, UnsupportedExporter};
use clipfeed::replay::{Replay, load_script};

#[derive(Parser)]
#[command(name = "clipfeed")]
#[command(about = "Headless driver for the clip chat feed")]
struct Cli {
    /// Config file (defaults to the user data dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON script of feed events and dump the resulting feed
    Replay {
        /// Script file (JSON array of events)
        script: PathBuf,

        /// Maximum number of messages shown
        #[arg(short, long)]
        capacity: Option<usize>,

        /// Evicted records kept for reuse
        #[arg(long)]
        max_recycled: Option<usize>,

        /// Local user id
        #[arg(long)]
        self_id: Option<String>,

        /// Directory exported images are written to
        #[arg(long)]
        downloads: Option<PathBuf>,

        /// Dump the feed after every event
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the effective configuration as JSON
    Config {
        /// Write the effective configuration back to disk
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => FeedConfig::load_from(path)?,
        None => FeedConfig::load(),
    };

    match cli.command {
        Commands::Replay {
            script,
            capacity,
            max_recycled,
            self_id,
            downloads,
            verbose,
        } => {
            if let Some(capacity) = capacity {
                config.capacity = capacity;
            }
            if let Some(max_recycled) = max_recycled {
                config.max_recycled = max_recycled;
            }
            if let Some(self_id) = self_id {
                config.self_id = self_id;
            }
            if downloads.is_some() {
                config.download_dir = downloads;
            }
            run_replay(&config, &script, verbose)?;
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save()?;
                eprintln!("Saved {}", config.path().display());
            }
        }
    }
    Ok(())
}

fn run_replay(
    config: &FeedConfig,
    script: &std::path::Path,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let events = load_script(script)?;
    tracing::info!("Replaying {} events from {}", events.len(), script.display());

    let downloads: Rc<dyn DownloadSink> = match &config.download_dir {
        Some(dir) => Rc::new(DirectoryDownloads::new(dir)),
        None => Rc::new(MemoryDownloads::new()),
    };
    let mut replay = Replay::new(config, Rc::new(UnsupportedExporter), downloads);

    for (i, event) in events.into_iter().enumerate() {
        replay.apply(event)?;
        if verbose {
            println!("--- after event {}", i + 1);
            print!("{}", replay.dump());
        }
    }
    if !verbose {
        print!("{}", replay.dump());
    }

    let stats = replay.stats();
    println!(
        "added {}, rejected {}, malformed {}, muted away {}, transitions {}, exports {}",
        stats.added,
        stats.rejected,
        stats.malformed,
        stats.muted_away,
        stats.transitions,
        stats.exports_started
    );

    let media = replay.finish()?;
    println!(
        "media: created {}, released {}, double releases {}",
        media.created, media.released, media.double_releases
    );
    Ok(())
}
