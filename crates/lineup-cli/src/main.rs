use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod curator;
mod engine;
mod fetch;

use config::Config;
use curator::Curator;
use engine::Engine;
use fetch::{HttpFetcher, RemoteEmbedder};

#[derive(Parser)]
#[command(name = "lineup", about = "Face identification pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive anchor embeddings from primary photos
    Anchors,
    /// Curate verified galleries from candidate photo pools
    Curate {
        /// Curate a single identity instead of all uncurated ones
        #[arg(short, long)]
        identity: Option<String>,
    },
    /// Rebuild the ANN index snapshot from the embedding store
    BuildIndex,
    /// Recognize the people in an image file
    Recognize {
        /// Path to the query image
        image: PathBuf,
    },
    /// Show store and curation status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env();
    let timeout = Duration::from_secs(cfg.http_timeout_secs);

    let store = Arc::new(lineup_store::EmbeddingStore::open(&cfg.db_path)?);
    let embedder = Arc::new(RemoteEmbedder::new(
        &cfg.embedder_endpoint,
        cfg.dimension,
        timeout,
    )?);

    match cli.command {
        Commands::Anchors => {
            let fetcher = Arc::new(HttpFetcher::new(timeout)?);
            let curator = Curator::new(store, fetcher, embedder);
            let stored = curator.process_anchors()?;
            println!("{stored} anchors stored");
        }
        Commands::Curate { identity } => {
            let fetcher = Arc::new(HttpFetcher::new(timeout)?);
            let curator = Curator::new(store.clone(), fetcher, embedder);
            match identity {
                Some(id) => {
                    let outcome = curator.curate(&id)?;
                    store.record_curation(&id, outcome.label(), outcome.verified())?;
                    println!("{id}: {outcome}");
                }
                None => {
                    let completed = curator.curate_all()?;
                    println!("{completed} identities curated");
                }
            }
        }
        Commands::BuildIndex => {
            let eng = Engine::new(store, embedder, cfg.index_prefix, cfg.dimension, cfg.trees);
            let slots = eng.rebuild()?;
            println!("index rebuilt: {slots} slots");
        }
        Commands::Recognize { image } => {
            let eng = Engine::new(store, embedder, cfg.index_prefix, cfg.dimension, cfg.trees);
            eng.load()?;
            let query = image::open(&image)?;
            let results = eng.recognize(&query)?;
            if results.is_empty() {
                println!("no faces detected");
            }
            for (i, face) in results.iter().enumerate() {
                match &face.display {
                    Some(record) => println!("face {}: {} ({})", i + 1, record.name, face.identity_id),
                    None => println!("face {}: {}", i + 1, face.identity_id),
                }
            }
        }
        Commands::Status => {
            let stats = store.stats()?;
            println!(
                "identities: {}  anchors: {}  verified: {}  candidates: {}",
                stats.identities, stats.anchors, stats.verified, stats.candidates
            );
            for record in store.recent_curations(10)? {
                println!(
                    "{}  {}  {} verified  ({})",
                    record.identity_id, record.outcome, record.verified, record.created_at
                );
            }
        }
    }

    Ok(())
}
