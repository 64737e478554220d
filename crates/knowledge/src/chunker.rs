//! Heading-aware text chunking with context prefixes.
//!
//! Markdown is split into blocks at heading lines (headings inside fenced code
//! do not split). Each chunk is prefixed with the document title and the
//! block's own heading so that a passage retrieved in isolation still carries
//! where it came from:
//!
//! ```text
//! [Document: Guide] [Section: Setup] ## Setup
//! Step one. Step two.
//! ```
//!
//! Lengths are measured in characters, not bytes.

use groundwork_core::{AppError, AppResult};

/// Number of leading lines searched for the document title.
const TITLE_SCAN_LINES: usize = 20;

const FENCE: &str = "```";

/// Chunk `text` into context-prefixed passages.
///
/// Blocks that fit in `chunk_size` together with their prefix are emitted
/// whole. Larger blocks are cut by a sliding window of
/// `chunk_size - prefix_len` characters that advances by `window - overlap`,
/// stopping once the remaining tail is shorter than the overlap. When the
/// prefix alone exceeds `chunk_size` the window falls back to half of
/// `chunk_size`. An overlap that would keep the window from advancing is
/// reduced to half the window.
///
/// # Errors
/// Returns `AppError::InvalidRequest` if `chunk_size` is zero or `overlap`
/// is not smaller than `chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> AppResult<Vec<String>> {
    if chunk_size == 0 {
        return Err(AppError::InvalidRequest(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(AppError::InvalidRequest(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let title = document_title(text);
    let mut chunks = Vec::new();

    for block in split_blocks(text) {
        let section = section_heading(&block);
        let prefix = context_prefix(title.as_deref(), section.as_deref());
        let prefix_len = prefix.chars().count();
        let block_chars: Vec<char> = block.chars().collect();

        if prefix_len + block_chars.len() <= chunk_size {
            chunks.push(format!("{}{}", prefix, block));
            continue;
        }

        let window = if chunk_size > prefix_len {
            chunk_size - prefix_len
        } else {
            (chunk_size / 2).max(1)
        };
        let step_overlap = if overlap >= window { window / 2 } else { overlap };

        for slice in sliding_windows(&block_chars, window, step_overlap) {
            chunks.push(format!("{}{}", prefix, slice));
        }
    }

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}

/// Build the `[Document: T] [Section: S] ` prefix.
///
/// The section part is dropped when empty or identical to the title.
pub fn context_prefix(title: Option<&str>, section: Option<&str>) -> String {
    let mut prefix = String::new();
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        prefix.push_str(&format!("[Document: {}] ", title));
    }
    if let Some(section) = section.filter(|s| !s.is_empty()) {
        if Some(section) != title {
            prefix.push_str(&format!("[Section: {}] ", section));
        }
    }
    prefix
}

/// First `# ` heading within the first lines of the document.
fn document_title(text: &str) -> Option<String> {
    text.lines()
        .take(TITLE_SCAN_LINES)
        .map(str::trim)
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Heading text if `line` is a markdown heading (`#` to `######` then whitespace).
fn heading_text(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let heading = rest.trim();
    (!heading.is_empty()).then_some(heading)
}

/// Split at heading lines, keeping fenced code regions whole.
fn split_blocks(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut blocks = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut in_code = false;

    for line in normalized.split('\n') {
        if line.trim().starts_with(FENCE) {
            in_code = !in_code;
            buf.push(line);
            continue;
        }

        if !in_code && heading_text(line).is_some() && !buf.is_empty() {
            blocks.push(buf.join("\n").trim().to_string());
            buf.clear();
        }
        buf.push(line);
    }

    if !buf.is_empty() {
        blocks.push(buf.join("\n").trim().to_string());
    }

    blocks.retain(|b| !b.is_empty());
    blocks
}

/// First heading in the block outside fenced code.
fn section_heading(block: &str) -> Option<String> {
    let mut in_code = false;
    for line in block.lines() {
        if line.trim().starts_with(FENCE) {
            in_code = !in_code;
            continue;
        }
        if !in_code {
            if let Some(heading) = heading_text(line) {
                return Some(heading.to_string());
            }
        }
    }
    None
}

fn sliding_windows(chars: &[char], window: usize, overlap: usize) -> Vec<String> {
    let len = chars.len();
    let step = window - overlap;
    let mut slices = Vec::new();
    let mut start = 0;

    while start < len {
        let end = (start + window).min(len);
        slices.push(chars[start..end].iter().collect());
        start += step;
        if start >= len.saturating_sub(overlap) {
            break;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Strip the bracketed context prefix from a chunk.
    fn body(chunk: &str, prefix: &str) -> String {
        chunk.strip_prefix(prefix).unwrap_or(chunk).to_string()
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 300, 50).unwrap().is_empty());
        assert!(chunk_text("   \n\t ", 300, 50).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            chunk_text("text", 0, 0),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            chunk_text("text", 10, 10),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_guide_setup_prefix() {
        let chunks = chunk_text("# Guide\n\n## Setup\nStep one. Step two.", 40, 5).unwrap();

        assert_eq!(chunks[0], "[Document: Guide] # Guide");
        let setup: Vec<&String> = chunks
            .iter()
            .filter(|c| c.starts_with("[Document: Guide] [Section: Setup] "))
            .collect();
        assert!(!setup.is_empty());
        assert!(setup[0].len() > "[Document: Guide] [Section: Setup] ".len());
    }

    #[test]
    fn test_small_block_kept_whole() {
        let text = "# Manual\n\n## Install\nRun the installer.";
        let chunks = chunk_text(text, 300, 50).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[1],
            "[Document: Manual] [Section: Install] ## Install\nRun the installer."
        );
    }

    #[test]
    fn test_no_title_no_prefix() {
        let chunks = chunk_text("plain text without headings", 300, 50).unwrap();
        assert_eq!(chunks, vec!["plain text without headings".to_string()]);
    }

    #[test]
    fn test_size_bound() {
        let text = format!("# Title\n\n## Body\n{}", "lorem ipsum dolor ".repeat(80));
        let prefix = "[Document: Title] [Section: Body] ";
        let chunks = chunk_text(&text, 120, 20).unwrap();

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120 + prefix.len());
        }
    }

    #[test]
    fn test_round_trip_modulo_overlap() {
        let body_text: String = (0..400)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let text = format!("# Doc\n\n## Part\n{}", body_text);
        let prefix = "[Document: Doc] [Section: Part] ";
        let chunk_size = 100;
        let overlap = 10;
        let chunks = chunk_text(&text, chunk_size, overlap).unwrap();

        let block = format!("## Part\n{}", body_text);
        let bodies: Vec<String> = chunks[1..].iter().map(|c| body(c, prefix)).collect();

        let mut rebuilt = bodies[0].clone();
        for piece in &bodies[1..] {
            rebuilt.push_str(&piece.chars().skip(overlap).collect::<String>());
        }
        assert_eq!(rebuilt, block);
    }

    #[test]
    fn test_fenced_heading_does_not_split() {
        let text = "# Doc\n\n## Code\n```bash\n# not a heading\necho hi\n```\nAfter.";
        let chunks = chunk_text(text, 500, 50).unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].contains("# not a heading"));
        assert!(chunks[1].starts_with("[Document: Doc] [Section: Code] "));
    }

    #[test]
    fn test_oversized_prefix_uses_half_window() {
        let title = "T".repeat(60);
        let text = format!("# {}\n{}", title, "x".repeat(100));
        let chunks = chunk_text(&text, 40, 5).unwrap();
        let prefix = format!("[Document: {}] ", title);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.starts_with(&prefix));
            assert!(body(chunk, &prefix).chars().count() <= 20);
        }
    }

    #[test]
    fn test_multibyte_characters() {
        let text = format!("# Résumé\n\n## Café\n{}", "é".repeat(200));
        let chunks = chunk_text(&text, 80, 10).unwrap();
        assert!(chunks.len() > 2);
        assert!(chunks.iter().all(|c| c.starts_with("[Document: Résumé]")));
    }

    #[test]
    fn test_deterministic() {
        let text = "# A\n\n## B\nbody text ".repeat(20);
        assert_eq!(
            chunk_text(&text, 60, 10).unwrap(),
            chunk_text(&text, 60, 10).unwrap()
        );
    }

    #[test]
    fn test_heading_detection() {
        assert_eq!(heading_text("## Setup"), Some("Setup"));
        assert_eq!(heading_text("#Setup"), None);
        assert_eq!(heading_text("####### Seven"), None);
        assert_eq!(heading_text("#   "), None);
    }

    #[test]
    fn test_context_prefix() {
        assert_eq!(context_prefix(Some("A"), Some("B")), "[Document: A] [Section: B] ");
        assert_eq!(context_prefix(Some("A"), Some("A")), "[Document: A] ");
        assert_eq!(context_prefix(None, Some("B")), "[Section: B] ");
        assert_eq!(context_prefix(None, None), "");
    }
}
