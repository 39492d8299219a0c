//! The rule set a scan runs with: managed rules when available, the built-in
//! defaults otherwise.

use tracing::warn;

use crate::engine::{scan_typography, TypographySuggestion};
use crate::rule::{default_rules, TypographyRule};
use crate::store::{RuleStore, TypographyRuleRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOrigin {
    Store,
    Defaults,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<TypographyRule>,
    origin: RuleOrigin,
    warnings: Vec<String>,
}

impl RuleSet {
    pub fn defaults() -> Self {
        Self {
            rules: default_rules(),
            origin: RuleOrigin::Defaults,
            warnings: Vec::new(),
        }
    }

    /// Enabled records in order. Records that no longer compile are skipped
    /// with a warning; an empty result falls back to the defaults.
    pub fn from_records(records: &[TypographyRuleRecord]) -> Self {
        let mut warnings = Vec::new();
        let mut rules = Vec::with_capacity(records.len());
        for record in records.iter().filter(|r| r.enabled) {
            match TypographyRule::from_record(record) {
                Ok(rule) => rules.push(rule),
                Err(err) => {
                    warn!(rule_id = %record.rule_id, error = %err, "skipping typography rule");
                    warnings.push(err.to_string());
                }
            }
        }
        if rules.is_empty() {
            let mut set = Self::defaults();
            set.warnings = warnings;
            return set;
        }
        Self {
            rules,
            origin: RuleOrigin::Store,
            warnings,
        }
    }

    /// Fetches the enabled rules. A failing store is not fatal: the defaults
    /// are used and the failure is kept as a warning.
    pub fn load<S: RuleStore>(store: &S) -> Self {
        match store.find_all(true) {
            Ok(records) => Self::from_records(&records),
            Err(err) => {
                warn!(error = %err, "failed to load typography rules, using defaults");
                let mut set = Self::defaults();
                set.warnings.push(format!("Failed to load typography rules: {err}"));
                set
            }
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Drops the given rule ids.
    pub fn without(mut self, rule_ids: &[String]) -> Self {
        if !rule_ids.is_empty() {
            self.rules.retain(|r| !rule_ids.contains(&r.id));
        }
        self
    }

    /// Keeps only the given rule ids; an empty list keeps everything.
    pub fn only(mut self, rule_ids: &[String]) -> Self {
        if !rule_ids.is_empty() {
            self.rules.retain(|r| rule_ids.contains(&r.id));
        }
        self
    }

    pub fn rules(&self) -> &[TypographyRule] {
        &self.rules
    }

    pub fn origin(&self) -> RuleOrigin {
        self.origin
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn scan(&self, text: &str) -> Vec<TypographySuggestion> {
        scan_typography(text, &self.rules)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::defaults()
    }
}
