//! Remove command handler.

use clap::Args;
use groundwork_core::{config::AppConfig, AppResult};
use groundwork_knowledge::{create_provider, ChunkStore, Ingestor};

/// Remove a document and its chunks
#[derive(Args, Debug)]
pub struct RemoveCommand {
    /// Source identifier as it was ingested
    pub source: String,
}

impl RemoveCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing remove command for '{}'", self.source);

        let store = ChunkStore::open(config.database_path(), &config.retrieval).await?;
        let ingestor = Ingestor::new(store, create_provider(&config.embedding)?, &config.retrieval);

        if ingestor.remove(&self.source).await? {
            println!("Removed {}", self.source);
        } else {
            println!("No document with source {}", self.source);
        }

        Ok(())
    }
}
