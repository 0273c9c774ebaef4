use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use mirror_cache::config::Config;
use mirror_cache::models::Document;
use mirror_cache::storage::{CachingCollection, MemoryCollection};
use mirror_cache_core::storage::{Collection, Query, StoreError};

/// mirror_cache - Keep a complete in-memory mirror of a collection
#[derive(Parser, Debug)]
#[command(name = "mirror_cache")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Number of documents to seed the source with
    #[arg(long, short, default_value = "3", env = "MIRROR_SEED")]
    seed: usize,

    /// Cache fill timeout in milliseconds, 0 disables it
    #[arg(long, env = "MIRROR_FILL_TIMEOUT_MS")]
    fill_timeout_ms: Option<u64>,

    /// Print the mirror contents as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirror_cache=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env();
    if let Some(fill_timeout_ms) = cli.fill_timeout_ms {
        config.fill_timeout_ms = fill_timeout_ms;
    }

    // The source assigns ids and revisions the way a server would
    let source =
        Arc::new(MemoryCollection::<Document>::new().with_normalizer(Document::normalize));
    for n in 1..=cli.seed {
        source
            .put(Document::draft(format!("Seed document {n}")))
            .await?;
    }

    let mirror = Arc::new(MemoryCollection::<Document>::new());
    let cache: CachingCollection<Document> =
        CachingCollection::with_config(source.clone(), mirror.clone(), config);
    cache.ready().await?;
    tracing::info!(documents = mirror.len().await, "Mirror ready");

    // Write through the decorator
    let written = cache.put(Document::draft("Written through the cache")).await?;
    tracing::info!(id = %written.id, revision = written.revision, "Document written through");

    // Another client writes to the source directly
    let direct = source.put(Document::draft("Written to the source")).await?;
    wait_for_sync(&cache, direct.id).await?;
    tracing::info!(id = %direct.id, "Out-of-band write mirrored");

    let by_title = Query::all().order_by(|a: &Document, b: &Document| a.title.cmp(&b.title));
    let documents = cache.select_all(&by_title).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
    } else {
        for doc in &documents {
            println!("{}  r{}  {}", doc.id, doc.revision, doc.title);
        }
    }

    Ok(())
}

/// Waits until the mirror has picked up a record written to the source.
async fn wait_for_sync(cache: &CachingCollection<Document>, id: Uuid) -> Result<()> {
    let polling = async {
        while !cache.contains(&id).await? {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok::<_, StoreError>(())
    };

    tokio::time::timeout(Duration::from_secs(5), polling)
        .await
        .context("timed out waiting for the mirror to sync")??;
    Ok(())
}
