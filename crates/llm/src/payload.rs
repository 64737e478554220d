//! Permissive extraction of structured payloads from model output.
//!
//! Models asked for "JSON only" still wrap it in markdown fences or chatter.
//! [`parse_payload`] tries progressively looser slices of the text and reports
//! either the typed value or a fallback with the reason, so callers branch on
//! a value instead of catching errors.

use serde::de::DeserializeOwned;

/// Outcome of parsing a structured payload out of free text.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    /// A slice of the text deserialized into `T`
    Structured(T),
    /// No slice parsed; the caller should use its default
    Fallback { reason: String },
}

impl<T> Parsed<T> {
    /// Convert into an `Option`, discarding the fallback reason.
    pub fn ok(self) -> Option<T> {
        match self {
            Parsed::Structured(value) => Some(value),
            Parsed::Fallback { .. } => None,
        }
    }
}

/// Parse a `T` from model output, tolerating fences and surrounding prose.
///
/// Slices are tried in order: the whole trimmed text, the body of a
/// ```` ```json ```` fence, the body of any ```` ``` ```` fence, the outermost
/// `{...}` span and the outermost `[...]` span.
pub fn parse_payload<T: DeserializeOwned>(text: &str) -> Parsed<T> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Parsed::Fallback {
            reason: "empty response".to_string(),
        };
    }

    let mut last_error = String::from("no JSON payload found");

    for candidate in candidate_slices(trimmed) {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Parsed::Structured(value),
            Err(e) => last_error = e.to_string(),
        }
    }

    Parsed::Fallback { reason: last_error }
}

fn candidate_slices(text: &str) -> Vec<&str> {
    let mut slices = vec![text];

    if let Some(body) = fenced_body(text, "```json") {
        slices.push(body);
    }
    if let Some(body) = fenced_body(text, "```") {
        slices.push(body);
    }
    if let Some(span) = outer_span(text, '{', '}') {
        slices.push(span);
    }
    if let Some(span) = outer_span(text, '[', ']') {
        slices.push(span);
    }

    slices.dedup();
    slices
}

/// Body between `opener` and the next closing fence, skipping a language tag.
fn fenced_body<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    // Skip the rest of the opening line (e.g. "json" after a bare fence)
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    let body = body[..end].trim();
    (!body.is_empty()).then_some(body)
}

fn outer_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Queries {
        queries: Vec<String>,
    }

    #[test]
    fn test_parse_clean_json() {
        let parsed: Parsed<Queries> = parse_payload(r#"{"queries": ["a", "b"]}"#);
        assert_eq!(
            parsed,
            Parsed::Structured(Queries {
                queries: vec!["a".into(), "b".into()]
            })
        );
    }

    #[test]
    fn test_parse_json_fence() {
        let text = "Here you go:\n```json\n{\"queries\": [\"dax measure\"]}\n```\nThanks";
        let parsed: Parsed<Queries> = parse_payload(text);
        assert_eq!(parsed.ok().unwrap().queries, vec!["dax measure"]);
    }

    #[test]
    fn test_parse_bare_fence() {
        let text = "```\n{\"queries\": [\"x++ class\"]}\n```";
        let parsed: Parsed<Queries> = parse_payload(text);
        assert_eq!(parsed.ok().unwrap().queries, vec!["x++ class"]);
    }

    #[test]
    fn test_parse_embedded_in_prose() {
        let text = "Sure! {\"queries\": [\"one\", \"two\"]} Let me know.";
        let parsed: Parsed<Queries> = parse_payload(text);
        assert_eq!(parsed.ok().unwrap().queries.len(), 2);
    }

    #[test]
    fn test_parse_array_payload() {
        let parsed: Parsed<Vec<String>> = parse_payload("Results: [\"a\", \"b\"]");
        assert_eq!(parsed.ok().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_fallback_on_garbage() {
        let parsed: Parsed<Queries> = parse_payload("I cannot help with that.");
        match parsed {
            Parsed::Fallback { reason } => assert!(!reason.is_empty()),
            Parsed::Structured(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn test_fallback_on_empty() {
        let parsed: Parsed<Queries> = parse_payload("   ");
        assert_eq!(
            parsed,
            Parsed::Fallback {
                reason: "empty response".to_string()
            }
        );
    }

    #[test]
    fn test_truncated_payload_has_no_value() {
        let parsed: Parsed<Vec<String>> = parse_payload("{broken");
        assert!(parsed.ok().is_none());
    }
}
