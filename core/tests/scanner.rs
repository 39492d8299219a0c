use proptest::prelude::*;
use tpg_core::{
    apply_suggestions, default_rules, find_excluded_ranges, scan_typography, scan_with_defaults,
    Replacement, TypographyRule, TypographySuggestion,
};

fn replacements(found: &[TypographySuggestion]) -> Vec<(&str, &str)> {
    found
        .iter()
        .map(|s| (s.original.as_str(), s.replacement.as_str()))
        .collect()
}

#[test]
fn triple_hyphen_yields_single_em_dash() {
    let found = scan_with_defaults("---");
    assert_eq!(found.len(), 1);
    assert_eq!((found[0].start, found[0].end), (0, 3));
    assert_eq!(found[0].replacement, "—");
}

#[test]
fn em_dash_in_inline_code_is_ignored() {
    assert!(scan_with_defaults("`---`").is_empty());
}

#[test]
fn double_backtick_span_is_not_protected() {
    let text = "x ``a--b`` y";
    let found = scan_with_defaults(text);
    assert_eq!(replacements(&found), vec![("--", "–")]);
    assert_eq!((found[0].start, found[0].end), (5, 7));
}

#[test]
fn fenced_blocks_are_ignored() {
    let text = "Before -- after.\n\n```sh\nrm -- \"file\"...\n```\n\nDone...";
    let found = scan_with_defaults(text);
    assert_eq!(replacements(&found), vec![("--", "–"), ("...", "…")]);
    assert!(found[1].start > text.find("```\n\nDone").unwrap());
}

#[test]
fn link_targets_are_ignored() {
    let text = "Read [\"the guide\"](https://example.com/a--b...c) today.";
    let found = scan_with_defaults(text);
    assert_eq!(
        replacements(&found),
        vec![("\"the guide\"", "“the guide”")]
    );
}

#[test]
fn quotes_already_curly_produce_no_suggestion() {
    assert!(scan_with_defaults("She said “fine” and ‘ok’.").is_empty());
}

#[test]
fn applying_all_suggestions_rewrites_every_range() {
    let text = "Wait... \"really\" -- it's 'done' --- ok";
    let found = scan_with_defaults(text);
    let fixed = apply_suggestions(text, &found);
    // The single-quote rule pairs the apostrophe with the next quote.
    assert_eq!(fixed, "Wait… “really” – it‘s ’done' — ok");
}

#[test]
fn rescanning_fixed_text_does_not_repeat_suggestions() {
    let text = "One -- two --- three... \"four\"";
    let found = scan_with_defaults(text);
    let fixed = apply_suggestions(text, &found);
    assert!(scan_with_defaults(&fixed).is_empty());
}

#[test]
fn earlier_custom_rule_wins_overlap() {
    let rules = vec![
        TypographyRule::new("arrow", "Use arrow", "->", Replacement::Fixed("→".into())).unwrap(),
        TypographyRule::new("dash", "Use en dash", "--", Replacement::Fixed("–".into())).unwrap(),
    ];
    let found = scan_typography("a --> b", &rules);
    let ids: Vec<&str> = found.iter().map(|s| s.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["arrow"]);
    assert_eq!((found[0].start, found[0].end), (3, 5));
}

proptest! {
    #[test]
    fn suggestions_never_overlap_and_are_sorted(text in "[-.\"'`a-z \\[\\]()\n]{0,80}") {
        let found = scan_typography(&text, &default_rules());
        for pair in found.windows(2) {
            prop_assert!(pair[0].start <= pair[1].start);
            prop_assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn suggestions_never_touch_excluded_ranges(text in "[-.\"'`a-z \\[\\]()\n]{0,80}") {
        let excluded = find_excluded_ranges(&text);
        for s in scan_typography(&text, &default_rules()) {
            prop_assert!(!excluded.iter().any(|r| r.overlaps(s.start, s.end)));
            prop_assert_eq!(&text[s.start..s.end], s.original.as_str());
            prop_assert_ne!(&s.original, &s.replacement);
        }
    }

    #[test]
    fn applied_length_matches_edits(text in "[-.a-z ]{0,60}") {
        let found = scan_typography(&text, &default_rules());
        let fixed = apply_suggestions(&text, &found);
        let removed: usize = found.iter().map(|s| s.end - s.start).sum();
        let added: usize = found.iter().map(|s| s.replacement.len()).sum();
        prop_assert_eq!(fixed.len(), text.len() - removed + added);
    }
}
