//! Retrieve command handler.

use super::print_json;
use clap::Args;
use groundwork_core::{config::AppConfig, AppResult};
use groundwork_knowledge::{RetrieveRequest, Retriever};

/// Retrieve ranked context for a query
#[derive(Args, Debug)]
pub struct RetrieveCommand {
    /// Query text
    pub query: String,

    /// Number of passages to retrieve
    #[arg(short = 'k', long, default_value = "5")]
    pub top_k: usize,

    /// Restrict to one domain
    #[arg(long)]
    pub domain: Option<String>,

    /// Restrict to departments (repeatable)
    #[arg(long)]
    pub department: Vec<String>,

    /// Restrict to chunks ingested under this client tag
    #[arg(long)]
    pub client: Option<String>,

    /// MMR lambda; higher favours relevance over diversity
    #[arg(long)]
    pub lambda: Option<f32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RetrieveCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing retrieve command");

        let retriever = Retriever::from_config(config).await?;

        let mut request = RetrieveRequest::new(self.query.clone(), self.top_k);
        if let Some(domain) = &self.domain {
            request = request.with_domain(domain.clone());
        }
        if !self.department.is_empty() {
            request = request.with_departments(self.department.clone());
        }
        if let Some(client) = &self.client {
            request = request.with_client_tag(client.clone());
        }
        if let Some(lambda) = self.lambda {
            request = request.with_mmr_lambda(lambda);
        }

        let output = retriever.retrieve(request).await?;

        if self.json {
            return print_json(&output);
        }

        if output.citations.is_empty() {
            println!("No matching passages.");
        } else {
            println!("{}", output.context_text);
            println!();
            println!("Sources:");
            for citation in &output.citations {
                println!(
                    "- {} (chunk {}, {})",
                    citation.source, citation.chunk_id, citation.channel
                );
            }
        }

        let meta = &output.meta;
        println!();
        println!(
            "{} selected from {} fused candidates ({} lexical hits) across {} queries in {}ms{}",
            meta.selected,
            meta.fused_candidates,
            meta.lexical_hits,
            meta.queries_expanded,
            meta.elapsed_ms,
            if meta.rerank_applied { ", reranked" } else { "" }
        );

        Ok(())
    }
}
