//! Validation and sanitization of user-authored rule definitions.
//!
//! Rule ids and descriptions are null-stripped and trimmed. Patterns and
//! replacements are only null-stripped: a pattern of `" {2,}"` or a
//! replacement of `" "` is meaningful exactly as written.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::store::RulePatch;

pub const RULE_ID_MAX_LEN: usize = 100;
pub const DESCRIPTION_MAX_LEN: usize = 500;
/// Caps pattern size as a rough guard against pathological patterns.
pub const PATTERN_MAX_LEN: usize = 2000;
pub const IMPORT_MAX_RULES: usize = 500;

static RULE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid rule id regex"));

static UNSAFE_REPLACEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[<>]|</(script|iframe|object)").expect("valid replacement guard regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Rule ID is required")]
    RuleIdRequired,
    #[error("Rule ID cannot be empty")]
    RuleIdEmpty,
    #[error("Rule ID must be 100 characters or less")]
    RuleIdTooLong,
    #[error("Rule ID must be lowercase alphanumeric with underscores only")]
    RuleIdFormat,
    #[error("Description is required")]
    DescriptionRequired,
    #[error("Description cannot be empty")]
    DescriptionEmpty,
    #[error("Description must be 500 characters or less")]
    DescriptionTooLong,
    #[error("Pattern is required")]
    PatternRequired,
    #[error("Pattern must be 2000 characters or less")]
    PatternTooLong,
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(String),
    #[error("Replacement contains invalid characters")]
    UnsafeReplacement,
    #[error("Sort order must be a non-negative integer")]
    SortOrder,
    #[error("direction must be \"up\" or \"down\"")]
    Direction,
    #[error("rules array is required and must not be empty")]
    EmptyImport,
    #[error("Cannot import more than 500 rules at once")]
    ImportTooLarge,
}

/// Body of a create request, and one entry of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateRuleRequest {
    pub rule_id: String,
    pub description: String,
    pub pattern: String,
    pub replacement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateRuleRequest {
    pub rule_id: Option<String>,
    pub description: Option<String>,
    pub pattern: Option<String>,
    pub replacement: Option<String>,
    pub sort_order: Option<i64>,
    pub enabled: Option<bool>,
}

/// A create request that passed validation. `sort_order` is still optional:
/// defaulting it needs the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRule {
    pub rule_id: String,
    pub description: String,
    pub pattern: String,
    pub replacement: String,
    pub sort_order: Option<i64>,
}

pub fn validate_create(request: &CreateRuleRequest) -> Result<ValidatedRule, ValidationError> {
    let rule_id = sanitize_string(&request.rule_id);
    let description = sanitize_string(&request.description);
    let pattern = strip_nulls(&request.pattern);
    let replacement = sanitize_replacement(&request.replacement)?;

    if rule_id.is_empty() {
        return Err(ValidationError::RuleIdRequired);
    }
    check_rule_id(&rule_id)?;
    if description.is_empty() {
        return Err(ValidationError::DescriptionRequired);
    }
    check_description(&description)?;
    validate_pattern(&pattern)?;
    let sort_order = request.sort_order.map(check_sort_order).transpose()?;

    Ok(ValidatedRule {
        rule_id,
        description,
        pattern,
        replacement,
        sort_order,
    })
}

pub fn validate_update(request: &UpdateRuleRequest) -> Result<RulePatch, ValidationError> {
    let mut patch = RulePatch::default();

    if let Some(raw) = &request.rule_id {
        let rule_id = sanitize_string(raw);
        if rule_id.is_empty() {
            return Err(ValidationError::RuleIdEmpty);
        }
        check_rule_id(&rule_id)?;
        patch.rule_id = Some(rule_id);
    }
    if let Some(raw) = &request.description {
        let description = sanitize_string(raw);
        if description.is_empty() {
            return Err(ValidationError::DescriptionEmpty);
        }
        check_description(&description)?;
        patch.description = Some(description);
    }
    if let Some(raw) = &request.pattern {
        let pattern = strip_nulls(raw);
        validate_pattern(&pattern)?;
        patch.pattern = Some(pattern);
    }
    if let Some(raw) = &request.replacement {
        patch.replacement = Some(sanitize_replacement(raw)?);
    }
    if let Some(order) = request.sort_order {
        patch.sort_order = Some(check_sort_order(order)?);
    }
    patch.enabled = request.enabled;

    Ok(patch)
}

/// Length-bounded and must compile. Compilation failures surface here, never
/// at scan time.
pub fn validate_pattern(pattern: &str) -> Result<(), ValidationError> {
    if pattern.is_empty() {
        return Err(ValidationError::PatternRequired);
    }
    if pattern.chars().count() > PATTERN_MAX_LEN {
        return Err(ValidationError::PatternTooLong);
    }
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|err| ValidationError::InvalidPattern(err.to_string()))
}

/// Null bytes stripped, never trimmed; markup-like content rejected.
pub fn sanitize_replacement(input: &str) -> Result<String, ValidationError> {
    let cleaned = strip_nulls(input);
    if UNSAFE_REPLACEMENT_RE.is_match(&cleaned) {
        return Err(ValidationError::UnsafeReplacement);
    }
    Ok(cleaned)
}

fn check_rule_id(rule_id: &str) -> Result<(), ValidationError> {
    if rule_id.chars().count() > RULE_ID_MAX_LEN {
        return Err(ValidationError::RuleIdTooLong);
    }
    if !RULE_ID_RE.is_match(rule_id) {
        return Err(ValidationError::RuleIdFormat);
    }
    Ok(())
}

fn check_description(description: &str) -> Result<(), ValidationError> {
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(ValidationError::DescriptionTooLong);
    }
    Ok(())
}

fn check_sort_order(order: i64) -> Result<i64, ValidationError> {
    if order < 0 {
        return Err(ValidationError::SortOrder);
    }
    Ok(order)
}

fn sanitize_string(input: &str) -> String {
    strip_nulls(input).trim().to_string()
}

fn strip_nulls(input: &str) -> String {
    input.replace('\0', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(rule_id: &str, pattern: &str, replacement: &str) -> CreateRuleRequest {
        CreateRuleRequest {
            rule_id: rule_id.into(),
            description: "Some rule".into(),
            pattern: pattern.into(),
            replacement: replacement.into(),
            sort_order: None,
        }
    }

    #[test]
    fn rejects_unclosed_group() {
        let err = validate_create(&request("bad", "(unclosed", "x")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPattern(_)));
    }

    #[test]
    fn preserves_pattern_and_replacement_whitespace() {
        let rule = validate_create(&request("collapse", " {2,}", " ")).unwrap();
        assert_eq!(rule.pattern, " {2,}");
        assert_eq!(rule.replacement, " ");
    }

    #[test]
    fn trims_and_strips_ids_and_descriptions() {
        let mut req = request("  spaced\0_id ", "--", "–");
        req.description = "  Dash \0".into();
        let rule = validate_create(&req).unwrap();
        assert_eq!(rule.rule_id, "spaced_id");
        assert_eq!(rule.description, "Dash");
    }

    #[test]
    fn strips_nulls_from_replacement() {
        let rule = validate_create(&request("nul", "x", "a\0b")).unwrap();
        assert_eq!(rule.replacement, "ab");
    }

    #[test]
    fn rule_id_constraints() {
        assert_eq!(
            validate_create(&request("", "x", "y")).unwrap_err(),
            ValidationError::RuleIdRequired
        );
        assert_eq!(
            validate_create(&request("Upper", "x", "y")).unwrap_err(),
            ValidationError::RuleIdFormat
        );
        let long = "a".repeat(RULE_ID_MAX_LEN + 1);
        assert_eq!(
            validate_create(&request(&long, "x", "y")).unwrap_err(),
            ValidationError::RuleIdTooLong
        );
    }

    #[test]
    fn description_constraints() {
        let mut req = request("ok", "x", "y");
        req.description = "   ".into();
        assert_eq!(
            validate_create(&req).unwrap_err(),
            ValidationError::DescriptionRequired
        );
        req.description = "d".repeat(DESCRIPTION_MAX_LEN + 1);
        assert_eq!(
            validate_create(&req).unwrap_err(),
            ValidationError::DescriptionTooLong
        );
    }

    #[test]
    fn pattern_length_is_bounded() {
        let long = "a".repeat(PATTERN_MAX_LEN + 1);
        let err = validate_create(&request("long", &long, "y")).unwrap_err();
        assert_eq!(err, ValidationError::PatternTooLong);
        assert_eq!(err.to_string(), "Pattern must be 2000 characters or less");
        assert_eq!(
            validate_create(&request("empty", "", "y")).unwrap_err(),
            ValidationError::PatternRequired
        );
    }

    #[test]
    fn rejects_markup_in_replacement() {
        for bad in ["<b>", "a > b", "</SCRIPT", "</iframe"] {
            assert_eq!(
                validate_create(&request("inj", "x", bad)).unwrap_err(),
                ValidationError::UnsafeReplacement,
                "{bad}"
            );
        }
    }

    #[test]
    fn allows_empty_replacement() {
        let rule = validate_create(&request("strip", "x+", "")).unwrap();
        assert_eq!(rule.replacement, "");
    }

    #[test]
    fn negative_sort_order_is_rejected() {
        let mut req = request("neg", "x", "y");
        req.sort_order = Some(-1);
        assert_eq!(validate_create(&req).unwrap_err(), ValidationError::SortOrder);
    }

    #[test]
    fn update_rejects_blank_fields_and_passes_enabled() {
        let blank = UpdateRuleRequest {
            rule_id: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(validate_update(&blank).unwrap_err(), ValidationError::RuleIdEmpty);

        let toggle = UpdateRuleRequest {
            enabled: Some(false),
            replacement: Some(" ".into()),
            ..Default::default()
        };
        let patch = validate_update(&toggle).unwrap();
        assert_eq!(patch.enabled, Some(false));
        assert_eq!(patch.replacement.as_deref(), Some(" "));
        assert!(patch.rule_id.is_none());
    }
}
