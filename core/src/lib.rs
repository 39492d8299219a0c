//! Typography suggestion engine.
//! Scans markdown for straight quotes, double and triple hyphens and three
//! dots, and proposes typographic replacements without ever touching code
//! spans, fenced blocks or link targets. Rules are either the built-in set or
//! managed records validated before they are stored.

pub mod apply;
pub mod config;
pub mod engine;
pub mod exclude;
pub mod rule;
pub mod service;
pub mod source;
pub mod store;
pub mod validate;

use serde::{Deserialize, Serialize};

pub use apply::{apply_suggestion, apply_suggestions};
pub use config::{load_config, Config};
pub use engine::{dedupe_suggestions, scan_rules, scan_typography, TypographySuggestion};
pub use exclude::{find_excluded_ranges, ExcludedRange};
pub use rule::{default_rules, Replacement, RuleError, TypographyRule};
pub use service::{Direction, ImportSummary, RuleService};
pub use source::{RuleOrigin, RuleSet};
pub use store::{
    ImportError, MemoryStore, RuleStore, StoreError, TypographyRuleRecord, YamlStore,
};
pub use validate::{CreateRuleRequest, UpdateRuleRequest, ValidationError};

/// Location metadata in 1-based line/column coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// Converts a byte offset to a line and a column counted in chars.
pub fn byte_to_location(text: &str, byte_offset: usize) -> Location {
    let byte_offset = byte_offset.min(text.len());
    let mut line = 1;
    let mut last_newline = 0;
    for (idx, ch) in text.char_indices() {
        if idx >= byte_offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            last_newline = idx + 1;
        }
    }
    let column = text
        .get(last_newline..byte_offset)
        .map_or(0, |s| s.chars().count())
        + 1;
    Location { line, column }
}

/// Scans with the built-in rules.
pub fn scan_with_defaults(text: &str) -> Vec<TypographySuggestion> {
    scan_typography(text, &default_rules())
}
