//! Citation and context-block assembly.

use crate::types::{ChunkImage, Citation, RetrievalCandidate};

/// Characters of chunk text kept in a snippet.
pub const SNIPPET_CHARS: usize = 700;

/// Separator between context lines.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Build one citation and one context line per selected candidate.
///
/// Context lines read `- (<source> :: chunk <id>) <title>: <snippet>` followed
/// by an `[IMAGE DESCRIPTION (<file>): <description>]` marker per described
/// image linked to the chunk.
pub fn assemble(
    selected: &[RetrievalCandidate],
    images: &[ChunkImage],
) -> (Vec<Citation>, String) {
    let mut citations = Vec::with_capacity(selected.len());
    let mut lines = Vec::with_capacity(selected.len());

    for candidate in selected {
        let title = display_title(&candidate.text);
        let snippet = snippet(&candidate.text);
        let chunk_images: Vec<ChunkImage> = images
            .iter()
            .filter(|img| img.chunk_id == candidate.chunk_id)
            .cloned()
            .collect();

        let image_markers: String = chunk_images
            .iter()
            .filter_map(|img| {
                img.image
                    .description
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                    .map(|d| format!("\n[IMAGE DESCRIPTION ({}): {}]", img.image.filename, d))
            })
            .collect();

        let body = if title.is_empty() {
            format!("{}{}", snippet, image_markers)
        } else {
            format!("{}: {}{}", title, snippet, image_markers)
        };
        lines.push(format!(
            "- ({} :: chunk {}) {}",
            candidate.source, candidate.chunk_id, body
        ));

        citations.push(Citation {
            chunk_id: candidate.chunk_id,
            source: candidate.source.clone(),
            domain: candidate.domain.clone(),
            title,
            snippet,
            text: candidate.text.clone(),
            channel: candidate.channel,
            images: chunk_images,
        });
    }

    (citations, lines.join(CONTEXT_SEPARATOR))
}

/// Text of the first line that starts with `#`, without the hashes.
fn display_title(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .unwrap_or_default()
}

fn snippet(text: &str) -> String {
    text.chars()
        .take(SNIPPET_CHARS)
        .collect::<String>()
        .replace('\n', " ")
        .trim()
        .to_string()
}
