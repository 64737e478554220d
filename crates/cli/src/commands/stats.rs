//! Stats command handler.
//!
//! Reports row counts and the on-disk size of the chunk store.

use super::print_json;
use clap::Args;
use groundwork_core::{config::AppConfig, AppResult};
use groundwork_knowledge::ChunkStore;

/// Show knowledge base statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let store = ChunkStore::open(config.database_path(), &config.retrieval).await?;
        let stats = store.stats().await?;

        if self.json {
            return print_json(&stats);
        }

        println!("Database:  {}", store.path().display());
        println!("Documents: {}", stats.documents);
        println!("Chunks:    {}", stats.chunks);
        println!("Images:    {}", stats.images);
        println!("Size:      {:.1} KiB", stats.db_size_bytes as f64 / 1024.0);

        Ok(())
    }
}
