//! Ingest command handler.
//!
//! Walks files and directories and writes every markdown or text document
//! into the chunk store.

use super::print_json;
use clap::Args;
use groundwork_core::{config::AppConfig, AppResult};
use groundwork_knowledge::{create_provider, ChunkStore, DocumentInput, IngestAction, Ingestor};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// Ingest documents into the knowledge base
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Domain tag (inferred from the path when omitted)
    #[arg(long)]
    pub domain: Option<String>,

    /// Department tag (inferred from the path and metadata when omitted)
    #[arg(long)]
    pub department: Option<String>,

    /// Client isolation tag
    #[arg(long)]
    pub client: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestSummary {
    created: usize,
    updated: usize,
    skipped: usize,
    failed: usize,
    chunks: usize,
    images: usize,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command");

        let store = ChunkStore::open(config.database_path(), &config.retrieval).await?;
        let embedder = create_provider(&config.embedding)?;
        let ingestor = Ingestor::new(store, embedder, &config.retrieval);

        let files = self.collect_files();
        tracing::debug!("Found {} candidate files", files.len());

        let mut summary = IngestSummary::default();
        for file in &files {
            let text = match std::fs::read_to_string(file) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Failed to read {:?}: {}", file, e);
                    summary.failed += 1;
                    continue;
                }
            };

            let mut input = DocumentInput::new(file.to_string_lossy(), text);
            input.domain = self.domain.clone();
            input.department = self.department.clone();
            input.client_tag = self.client.clone();

            match ingestor.ingest(input).await {
                Ok(outcome) => {
                    match outcome.action {
                        IngestAction::Created => summary.created += 1,
                        IngestAction::Updated => summary.updated += 1,
                        IngestAction::Skipped => summary.skipped += 1,
                    }
                    summary.chunks += outcome.chunks;
                    summary.images += outcome.images;
                }
                Err(e) => {
                    tracing::warn!("Failed to ingest {:?}: {}", file, e);
                    summary.failed += 1;
                }
            }
        }

        if self.json {
            print_json(&summary)?;
        } else {
            println!(
                "Ingested {} files: {} created, {} updated, {} skipped, {} failed ({} chunks, {} images)",
                files.len(),
                summary.created,
                summary.updated,
                summary.skipped,
                summary.failed,
                summary.chunks,
                summary.images
            );
        }

        Ok(())
    }

    fn collect_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for path in &self.paths {
            if path.is_file() {
                files.push(path.clone());
            } else if path.is_dir() {
                files.extend(
                    WalkDir::new(path)
                        .follow_links(false)
                        .into_iter()
                        .filter_map(|e| e.ok())
                        .filter(|e| e.file_type().is_file() && has_text_extension(e.path()))
                        .map(|e| e.into_path()),
                );
            } else {
                tracing::warn!("Path not found: {:?}", path);
            }
        }
        files.sort();
        files.dedup();
        files
    }
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
