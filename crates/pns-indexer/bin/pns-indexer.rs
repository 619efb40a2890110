use pns_indexer::{
    Config,
    IndexerError,
};

use pns_core::events::FeedItem;

use std::io::BufRead;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(config.log_level.into())
                .from_env_lossy(),
        )
        .init();

    let indexer = config.build()?;

    let (tx, rx) = mpsc::unbounded_channel();
    let cancellation_token = CancellationToken::new();
    let mut worker = tokio::spawn(indexer.run(rx, cancellation_token.clone()));

    let file = std::fs::File::open(&config.feed)?;
    let mut queued = 0u64;
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item: FeedItem = serde_json::from_str(&line)?;
        tx.send(item)?;
        queued += 1;
    }
    tracing::info!(queued, feed = %config.feed.display(), "Queued feed items");

    // Closing the channel lets the worker stop once it has drained the feed.
    drop(tx);

    tokio::select! {
        result = &mut worker => {
            handle_worker_result(result?);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C signal, initiating graceful shutdown");
            cancellation_token.cancel();
            handle_worker_result(worker.await?);
        }
    }

    Ok(())
}

/// Handle the result of the feed worker
fn handle_worker_result(result: Result<(), IndexerError>) {
    match result {
        Ok(()) => tracing::info!("Feed replay complete"),
        Err(e) => {
            tracing::error!("Indexer encountered an error: {}", e);
        }
    }
}
