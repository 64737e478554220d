//! Language-model gateway for Groundwork.
//!
//! This crate provides a provider-agnostic abstraction for the chat-style
//! completions the retrieval engine needs (query expansion and reranking),
//! plus permissive parsing of structured payloads embedded in model output.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Mock**: Scripted responses for tests and offline runs
//!
//! # Example
//! ```no_run
//! use groundwork_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::with_base_url("http://localhost:11434")?;
//! let request = LlmRequest::new("Hello, world!", "llama3.2").with_system("Be brief.");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod payload;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use payload::{parse_payload, Parsed};
pub use providers::{MockLlmClient, OllamaClient};
pub use types::ProviderType;
