//! Images command handler.

use super::print_json;
use clap::Args;
use groundwork_core::{config::AppConfig, AppResult};
use groundwork_knowledge::retrieval::DEFAULT_IMAGE_SIMILARITY;
use groundwork_knowledge::Retriever;

/// Find images by description
#[derive(Args, Debug)]
pub struct ImagesCommand {
    /// What the image should show
    pub query: String,

    /// Maximum number of images
    #[arg(short = 'k', long, default_value = "5")]
    pub top_k: usize,

    /// Minimum description similarity
    #[arg(long, default_value_t = DEFAULT_IMAGE_SIMILARITY)]
    pub min_similarity: f32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ImagesCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing images command");

        let retriever = Retriever::from_config(config).await?;
        let matches = retriever
            .search_images(&self.query, self.top_k, self.min_similarity)
            .await?;

        if self.json {
            return print_json(&matches);
        }

        if matches.is_empty() {
            println!("No matching images.");
        }
        for m in &matches {
            println!(
                "{:.3}  {}  {}",
                m.similarity,
                m.image.storage_path,
                m.image.description.as_deref().unwrap_or("")
            );
        }

        Ok(())
    }
}
