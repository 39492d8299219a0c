//! Admin operations over a [`RuleStore`]. Every write is validated before it
//! reaches the store.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{ImportError, NewRule, RuleStore, StoreError, TypographyRuleRecord};
use crate::validate::{
    validate_create, validate_update, CreateRuleRequest, UpdateRuleRequest, ValidationError,
    IMPORT_MAX_RULES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            _ => Err(ValidationError::Direction),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

/// Result of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: usize,
    pub failed: usize,
    pub errors: Vec<ImportError>,
}

pub struct RuleService<S> {
    store: S,
}

impl<S: RuleStore> RuleService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// The view consumed by editors.
    pub fn enabled_rules(&self) -> Result<Vec<TypographyRuleRecord>, StoreError> {
        self.store.find_all(true)
    }

    /// The admin view, disabled rules included.
    pub fn all_rules(&self) -> Result<Vec<TypographyRuleRecord>, StoreError> {
        self.store.find_all(false)
    }

    pub fn get(&self, id: &str) -> Result<TypographyRuleRecord, StoreError> {
        self.store.find_by_id(id)?.ok_or(StoreError::NotFound)
    }

    pub fn create(
        &mut self,
        request: &CreateRuleRequest,
    ) -> Result<TypographyRuleRecord, StoreError> {
        let rule = validate_create(request)?;
        let sort_order = match rule.sort_order {
            Some(order) => order,
            None => next_sort_order(self.max_sort_order()?)?,
        };
        let record = self.store.create(NewRule {
            rule_id: rule.rule_id,
            description: rule.description,
            pattern: rule.pattern,
            replacement: rule.replacement,
            sort_order,
        })?;
        info!(rule_id = %record.rule_id, sort_order, "created typography rule");
        Ok(record)
    }

    pub fn update(
        &mut self,
        id: &str,
        request: &UpdateRuleRequest,
    ) -> Result<TypographyRuleRecord, StoreError> {
        let patch = validate_update(request)?;
        let record = self.store.update(id, patch)?;
        info!(rule_id = %record.rule_id, "updated typography rule");
        Ok(record)
    }

    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id)?;
        info!(id, "deleted typography rule");
        Ok(())
    }

    /// Swaps a rule with its neighbour in the full ordered list. Moving past
    /// either end returns the list unchanged.
    ///
    /// When both rules share a sort order a plain swap would change nothing,
    /// so the whole list is renumbered densely with the move applied. Either
    /// way the new orders reach the store as a single write.
    pub fn reorder(
        &mut self,
        id: &str,
        direction: Direction,
    ) -> Result<Vec<TypographyRuleRecord>, StoreError> {
        let mut rules = self.store.find_all(false)?;
        let idx = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound)?;
        let swap_idx = match direction {
            Direction::Up if idx > 0 => idx - 1,
            Direction::Down if idx + 1 < rules.len() => idx + 1,
            _ => return Ok(rules),
        };

        let (a_order, b_order) = (rules[idx].sort_order, rules[swap_idx].sort_order);
        let orders: Vec<(String, i64)> = if a_order != b_order {
            vec![
                (rules[idx].id.clone(), b_order),
                (rules[swap_idx].id.clone(), a_order),
            ]
        } else {
            rules.swap(idx, swap_idx);
            rules
                .iter()
                .enumerate()
                .filter(|(position, rule)| rule.sort_order != *position as i64)
                .map(|(position, rule)| (rule.id.clone(), position as i64))
                .collect()
        };
        self.store.set_sort_orders(&orders)?;
        debug!(id, %direction, "reordered typography rule");
        self.store.find_all(false)
    }

    /// Validates every record on its own and stores the valid ones.
    ///
    /// Only an empty or oversized batch fails as a whole.
    pub fn bulk_import(
        &mut self,
        requests: &[CreateRuleRequest],
    ) -> Result<ImportSummary, StoreError> {
        if requests.is_empty() {
            return Err(ValidationError::EmptyImport.into());
        }
        if requests.len() > IMPORT_MAX_RULES {
            return Err(ValidationError::ImportTooLarge.into());
        }

        let mut max_order = self.max_sort_order()?;
        let mut valid = Vec::with_capacity(requests.len());
        let mut errors = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            let validated = validate_create(request).and_then(|rule| {
                let sort_order = match rule.sort_order {
                    Some(order) => order,
                    None => {
                        max_order = next_sort_order(max_order)?;
                        max_order
                    }
                };
                Ok(NewRule {
                    rule_id: rule.rule_id,
                    description: rule.description,
                    pattern: rule.pattern,
                    replacement: rule.replacement,
                    sort_order,
                })
            });
            match validated {
                Ok(rule) => valid.push(rule),
                Err(err) => errors.push(ImportError {
                    rule_id: if request.rule_id.is_empty() {
                        format!("[{index}]")
                    } else {
                        request.rule_id.clone()
                    },
                    message: err.to_string(),
                }),
            }
        }

        let outcome = self.store.create_many(valid)?;
        errors.extend(outcome.errors);
        let summary = ImportSummary {
            created: outcome.created,
            failed: errors.len(),
            errors,
        };
        info!(
            created = summary.created,
            failed = summary.failed,
            "imported typography rules"
        );
        Ok(summary)
    }

    /// Highest sort order in the store, 0 when empty.
    pub fn max_sort_order(&self) -> Result<i64, StoreError> {
        Ok(self
            .store
            .find_all(false)?
            .iter()
            .map(|r| r.sort_order)
            .max()
            .unwrap_or(0)
            .max(0))
    }
}

/// Sort order after `max`; fails instead of wrapping at `i64::MAX`.
fn next_sort_order(max: i64) -> Result<i64, ValidationError> {
    max.checked_add(1).ok_or(ValidationError::SortOrder)
}
