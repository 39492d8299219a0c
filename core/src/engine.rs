//! Rule engine and suggestion deduplication.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::exclude::{find_excluded_ranges, overlaps_any, ExcludedRange};
use crate::rule::TypographyRule;

/// A proposed, not yet applied, replacement of `original` at `[start, end)`.
///
/// Offsets are byte offsets into the scanned text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypographySuggestion {
    pub start: usize,
    pub end: usize,
    pub original: String,
    pub replacement: String,
    pub description: String,
    pub rule_id: String,
}

impl TypographySuggestion {
    pub fn overlaps(&self, other: &TypographySuggestion) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// Runs every rule over the unmodified text, in rule order.
///
/// The result is unsorted and may overlap; see [`dedupe_suggestions`].
pub fn scan_rules(
    text: &str,
    excluded: &[ExcludedRange],
    rules: &[TypographyRule],
) -> Vec<TypographySuggestion> {
    let mut suggestions = Vec::new();
    for rule in rules {
        for caps in rule.pattern().captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let (start, end) = (whole.start(), whole.end());
            if overlaps_any(excluded, start, end) {
                continue;
            }
            let Some(replacement) = rule.suggest(&caps) else {
                continue;
            };
            suggestions.push(TypographySuggestion {
                start,
                end,
                original: whole.as_str().to_string(),
                replacement,
                description: rule.description.clone(),
                rule_id: rule.id.clone(),
            });
        }
    }
    suggestions
}

/// Keeps the first suggestion of every overlapping group, then sorts by start.
pub fn dedupe_suggestions(suggestions: Vec<TypographySuggestion>) -> Vec<TypographySuggestion> {
    let total = suggestions.len();
    let mut accepted: Vec<TypographySuggestion> = Vec::with_capacity(total);
    for candidate in suggestions {
        if accepted.iter().any(|kept| kept.overlaps(&candidate)) {
            continue;
        }
        accepted.push(candidate);
    }
    accepted.sort_by_key(|s| s.start);
    debug!(total, kept = accepted.len(), "deduplicated typography suggestions");
    accepted
}

/// Exclusion scan, rule engine and deduplication in one call.
pub fn scan_typography(text: &str, rules: &[TypographyRule]) -> Vec<TypographySuggestion> {
    let excluded = find_excluded_ranges(text);
    let raw = scan_rules(text, &excluded, rules);
    debug!(
        rules = rules.len(),
        excluded = excluded.len(),
        raw = raw.len(),
        "scanned text for typography"
    );
    dedupe_suggestions(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{default_rules, Replacement};

    fn suggestion(start: usize, end: usize, rule_id: &str) -> TypographySuggestion {
        TypographySuggestion {
            start,
            end,
            original: String::new(),
            replacement: "x".into(),
            description: String::new(),
            rule_id: rule_id.into(),
        }
    }

    #[test]
    fn em_dash_wins_over_en_dash() {
        let found = scan_typography("---", &default_rules());
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].start, found[0].end), (0, 3));
        assert_eq!(found[0].replacement, "—");
        assert_eq!(found[0].rule_id, "em_dash");
    }

    #[test]
    fn raw_scan_reports_overlaps_before_dedupe() {
        let raw = scan_rules("---", &[], &default_rules());
        let ids: Vec<&str> = raw.iter().map(|s| s.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["em_dash", "en_dash"]);
    }

    #[test]
    fn inline_code_is_never_rewritten() {
        assert!(scan_typography("`---`", &default_rules()).is_empty());
    }

    #[test]
    fn link_target_is_skipped_but_label_is_not() {
        let text = "[a--b](http://x.io/a--b)";
        let found = scan_typography(text, &default_rules());
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].start, found[0].end), (2, 4));
    }

    #[test]
    fn double_quotes_keep_inner_text() {
        let found = scan_typography("say \"hi there\" ok", &default_rules());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].original, "\"hi there\"");
        assert_eq!(found[0].replacement, "“hi there”");
    }

    #[test]
    fn curly_quotes_produce_nothing() {
        assert!(scan_typography("say “hi” and ‘yo’", &default_rules()).is_empty());
    }

    #[test]
    fn dedupe_is_first_found_wins_then_sorted() {
        let input = vec![
            suggestion(10, 12, "a"),
            suggestion(2, 5, "b"),
            suggestion(4, 11, "c"),
            suggestion(0, 2, "d"),
        ];
        let ids: Vec<String> = dedupe_suggestions(input)
            .into_iter()
            .map(|s| s.rule_id)
            .collect();
        assert_eq!(ids, vec!["d", "b", "a"]);
    }

    #[test]
    fn rule_order_decides_overlap_winner() {
        let en = TypographyRule::new("en", "en", "--", Replacement::Fixed("–".into())).unwrap();
        let em = TypographyRule::new("em", "em", "---", Replacement::Fixed("—".into())).unwrap();
        let found = scan_typography("---", &[en, em]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_id, "en");
        assert_eq!((found[0].start, found[0].end), (0, 2));
    }
}
