//! Command handlers for the groundwork CLI.

pub mod images;
pub mod ingest;
pub mod remove;
pub mod retrieve;
pub mod stats;

pub use images::ImagesCommand;
pub use ingest::IngestCommand;
pub use remove::RemoveCommand;
pub use retrieve::RetrieveCommand;
pub use stats::StatsCommand;

use groundwork_core::AppResult;
use serde::Serialize;

/// Pretty-print a value as JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
