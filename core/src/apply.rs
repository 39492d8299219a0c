//! Applying accepted suggestions back onto the source text.

use tracing::warn;

use crate::engine::TypographySuggestion;

/// Splices one suggestion into `text`.
///
/// A suggestion whose range is out of bounds or not on char boundaries is
/// skipped and `text` is returned unchanged.
pub fn apply_suggestion(text: &str, suggestion: &TypographySuggestion) -> String {
    let (start, end) = (suggestion.start, suggestion.end);
    if start > end || end > text.len() || !text.is_char_boundary(start) || !text.is_char_boundary(end)
    {
        warn!(
            start,
            end,
            len = text.len(),
            rule = %suggestion.rule_id,
            "skipping suggestion with invalid range"
        );
        return text.to_string();
    }
    let mut out =
        String::with_capacity(text.len() - (end - start) + suggestion.replacement.len());
    out.push_str(&text[..start]);
    out.push_str(&suggestion.replacement);
    out.push_str(&text[end..]);
    out
}

/// Applies disjoint suggestions from the highest offset down so every
/// lower-offset range stays valid against the partially edited text.
pub fn apply_suggestions(text: &str, suggestions: &[TypographySuggestion]) -> String {
    let mut ordered: Vec<&TypographySuggestion> = suggestions.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));
    ordered
        .into_iter()
        .fold(text.to_string(), |acc, suggestion| apply_suggestion(&acc, suggestion))
}
