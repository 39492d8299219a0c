//! Typography rules: a compiled pattern plus a replacement policy.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::store::TypographyRuleRecord;

/// How a match is turned into its suggested text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "kebab-case")]
pub enum Replacement {
    /// Replace the whole match with this text.
    Fixed(String),
    /// `$1`..`$9` expand to the matching capture group.
    Template(String),
}

impl Replacement {
    /// Picks `Template` when `text` carries a `$<digit>` placeholder.
    pub fn parse(text: &str) -> Self {
        if PLACEHOLDER_RE.is_match(text) {
            Replacement::Template(text.to_string())
        } else {
            Replacement::Fixed(text.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Replacement::Fixed(text) | Replacement::Template(text) => text,
        }
    }

    /// Builds the replacement for one match.
    pub fn expand(&self, caps: &Captures<'_>) -> String {
        match self {
            Replacement::Fixed(text) => text.clone(),
            Replacement::Template(template) => expand_template(template, caps),
        }
    }
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$[1-9]").expect("valid placeholder regex"));

/// Single pass: group text is never re-expanded, and `$n` past the pattern's
/// group count stays literal.
fn expand_template(template: &str, caps: &Captures<'_>) -> String {
    let group_count = caps.len().saturating_sub(1);
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '$' {
            if let Some(index) = chars
                .peek()
                .and_then(|next| next.to_digit(10))
                .map(|d| d as usize)
                .filter(|&d| d >= 1 && d <= group_count)
            {
                chars.next();
                out.push_str(caps.get(index).map_or("", |m| m.as_str()));
                continue;
            }
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid pattern for rule `{rule_id}`: {source}")]
    Pattern {
        rule_id: String,
        #[source]
        source: regex::Error,
    },
}

/// A rule ready to scan with. The pattern is always already compiled.
#[derive(Debug, Clone)]
pub struct TypographyRule {
    pub id: String,
    pub description: String,
    pattern: Regex,
    pub replacement: Replacement,
}

impl TypographyRule {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        pattern: &str,
        replacement: Replacement,
    ) -> Result<Self, RuleError> {
        let id = id.into();
        let pattern = Regex::new(pattern).map_err(|source| RuleError::Pattern {
            rule_id: id.clone(),
            source,
        })?;
        Ok(Self {
            id,
            description: description.into(),
            pattern,
            replacement,
        })
    }

    /// Converts a stored record. Records can come from a hand-edited file, so
    /// the pattern is compiled again here rather than trusted.
    pub fn from_record(record: &TypographyRuleRecord) -> Result<Self, RuleError> {
        Self::new(
            record.rule_id.clone(),
            record.description.clone(),
            &record.pattern,
            Replacement::parse(&record.replacement),
        )
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Replacement for a match, or `None` when it would leave the text as is.
    pub fn suggest(&self, caps: &Captures<'_>) -> Option<String> {
        let matched = caps.get(0)?.as_str();
        let replacement = self.replacement.expand(caps);
        (replacement != matched).then_some(replacement)
    }
}

static DEFAULT_RULES: Lazy<Vec<TypographyRule>> = Lazy::new(|| {
    // Em dash must precede en dash: both match inside "---" and the earlier
    // rule wins the overlap.
    [
        ("ellipsis", "Use ellipsis character", r"\.{3}", Replacement::Fixed("…".into())),
        ("em_dash", "Use em dash", r"---", Replacement::Fixed("—".into())),
        ("en_dash", "Use en dash", r"--", Replacement::Fixed("–".into())),
        (
            "smart_quotes_double",
            "Use smart double quotes",
            r#""(.*?)""#,
            Replacement::Template("“$1”".into()),
        ),
        (
            "smart_quotes_single",
            "Use smart single quotes",
            r"'(.*?)'",
            Replacement::Template("‘$1’".into()),
        ),
    ]
    .into_iter()
    .map(|(id, description, pattern, replacement)| {
        TypographyRule::new(id, description, pattern, replacement).expect("static regex")
    })
    .collect()
});

/// Built-in rules used when no managed rule set is available.
pub fn default_rules() -> Vec<TypographyRule> {
    DEFAULT_RULES.clone()
}
