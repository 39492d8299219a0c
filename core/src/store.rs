//! Persistence for managed typography rules.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::validate::ValidationError;

/// A persisted rule as exposed over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypographyRuleRecord {
    pub id: String,
    pub sort_order: i64,
    pub enabled: bool,
    pub rule_id: String,
    pub description: String,
    pub pattern: String,
    pub replacement: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to [`RuleStore::create`]; already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRule {
    pub rule_id: String,
    pub description: String,
    pub pattern: String,
    pub replacement: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulePatch {
    pub rule_id: Option<String>,
    pub description: Option<String>,
    pub pattern: Option<String>,
    pub replacement: Option<String>,
    pub sort_order: Option<i64>,
    pub enabled: Option<bool>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.rule_id.is_none()
            && self.description.is_none()
            && self.pattern.is_none()
            && self.replacement.is_none()
            && self.sort_order.is_none()
            && self.enabled.is_none()
    }
}

/// One record that a batch operation could not store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportError {
    pub rule_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub created: usize,
    pub errors: Vec<ImportError>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Typography rule not found")]
    NotFound,
    #[error("Rule ID `{0}` already exists")]
    Duplicate(String),
    #[error("failed to access rule store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid rule store {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Storage backend for rule records. Rule ids are unique across the store.
pub trait RuleStore {
    /// Records ordered by `sort_order`, ties broken by creation time.
    fn find_all(&self, enabled_only: bool) -> Result<Vec<TypographyRuleRecord>, StoreError>;

    fn find_by_id(&self, id: &str) -> Result<Option<TypographyRuleRecord>, StoreError>;

    fn create(&mut self, rule: NewRule) -> Result<TypographyRuleRecord, StoreError>;

    /// Creates as many records as possible; failures are reported per record.
    fn create_many(&mut self, rules: Vec<NewRule>) -> Result<BatchOutcome, StoreError> {
        let mut outcome = BatchOutcome::default();
        for rule in rules {
            let rule_id = rule.rule_id.clone();
            match self.create(rule) {
                Ok(_) => outcome.created += 1,
                Err(err) => outcome.errors.push(ImportError {
                    rule_id,
                    message: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }

    /// An empty patch returns the record unchanged.
    fn update(&mut self, id: &str, patch: RulePatch) -> Result<TypographyRuleRecord, StoreError>;

    fn delete(&mut self, id: &str) -> Result<(), StoreError>;

    /// Assigns new sort orders to several records as one write.
    ///
    /// The default applies one update per record; stores that can should
    /// override it so a failure leaves every record untouched.
    fn set_sort_orders(&mut self, orders: &[(String, i64)]) -> Result<(), StoreError> {
        for (id, sort_order) in orders {
            self.update(
                id,
                RulePatch {
                    sort_order: Some(*sort_order),
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<TypographyRuleRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<TypographyRuleRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TypographyRuleRecord] {
        &self.records
    }

    fn ensure_unique(&self, rule_id: &str, except: Option<&str>) -> Result<(), StoreError> {
        let taken = self
            .records
            .iter()
            .any(|r| r.rule_id == rule_id && Some(r.id.as_str()) != except);
        if taken {
            return Err(StoreError::Duplicate(rule_id.to_string()));
        }
        Ok(())
    }
}

impl RuleStore for MemoryStore {
    fn find_all(&self, enabled_only: bool) -> Result<Vec<TypographyRuleRecord>, StoreError> {
        let mut rows: Vec<TypographyRuleRecord> = self
            .records
            .iter()
            .filter(|r| !enabled_only || r.enabled)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(rows)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<TypographyRuleRecord>, StoreError> {
        Ok(self.records.iter().find(|r| r.id == id).cloned())
    }

    fn create(&mut self, rule: NewRule) -> Result<TypographyRuleRecord, StoreError> {
        self.ensure_unique(&rule.rule_id, None)?;
        let now = Utc::now();
        let record = TypographyRuleRecord {
            id: Uuid::new_v4().to_string(),
            sort_order: rule.sort_order,
            enabled: true,
            rule_id: rule.rule_id,
            description: rule.description,
            pattern: rule.pattern,
            replacement: rule.replacement,
            created_at: now,
            updated_at: now,
        };
        self.records.push(record.clone());
        Ok(record)
    }

    fn update(&mut self, id: &str, patch: RulePatch) -> Result<TypographyRuleRecord, StoreError> {
        if let Some(rule_id) = &patch.rule_id {
            self.ensure_unique(rule_id, Some(id))?;
        }
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound)?;
        if patch.is_empty() {
            return Ok(record.clone());
        }
        let RulePatch {
            rule_id,
            description,
            pattern,
            replacement,
            sort_order,
            enabled,
        } = patch;
        if let Some(v) = rule_id {
            record.rule_id = v;
        }
        if let Some(v) = description {
            record.description = v;
        }
        if let Some(v) = pattern {
            record.pattern = v;
        }
        if let Some(v) = replacement {
            record.replacement = v;
        }
        if let Some(v) = sort_order {
            record.sort_order = v;
        }
        if let Some(v) = enabled {
            record.enabled = v;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        if self.records.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn set_sort_orders(&mut self, orders: &[(String, i64)]) -> Result<(), StoreError> {
        if !orders
            .iter()
            .all(|(id, _)| self.records.iter().any(|r| &r.id == id))
        {
            return Err(StoreError::NotFound);
        }
        let now = Utc::now();
        for (id, sort_order) in orders {
            if let Some(record) = self.records.iter_mut().find(|r| &r.id == id) {
                record.sort_order = *sort_order;
                record.updated_at = now;
            }
        }
        Ok(())
    }
}

/// Store backed by a YAML list of records on disk.
///
/// The file is read once on open (a missing file is an empty store) and
/// rewritten through a temporary sibling plus rename after every mutation.
#[derive(Debug, Clone)]
pub struct YamlStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl YamlStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_yaml::from_str(&text).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), records = records.len(), "opened rule store");
        Ok(Self {
            path,
            inner: MemoryStore::from_records(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let yaml = serde_yaml::to_string(self.inner.records()).map_err(|source| {
            StoreError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, yaml).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    /// Runs a mutation and writes the file only if it succeeded. A failed
    /// write rolls the in-memory state back.
    fn mutate<T>(
        &mut self,
        op: impl FnOnce(&mut MemoryStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let snapshot = self.inner.clone();
        let value = op(&mut self.inner)?;
        if let Err(err) = self.persist() {
            self.inner = snapshot;
            return Err(err);
        }
        Ok(value)
    }
}

impl RuleStore for YamlStore {
    fn find_all(&self, enabled_only: bool) -> Result<Vec<TypographyRuleRecord>, StoreError> {
        self.inner.find_all(enabled_only)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<TypographyRuleRecord>, StoreError> {
        self.inner.find_by_id(id)
    }

    fn create(&mut self, rule: NewRule) -> Result<TypographyRuleRecord, StoreError> {
        self.mutate(|store| store.create(rule))
    }

    fn create_many(&mut self, rules: Vec<NewRule>) -> Result<BatchOutcome, StoreError> {
        self.mutate(|store| store.create_many(rules))
    }

    fn update(&mut self, id: &str, patch: RulePatch) -> Result<TypographyRuleRecord, StoreError> {
        self.mutate(|store| store.update(id, patch))
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.mutate(|store| store.delete(id))
    }

    fn set_sort_orders(&mut self, orders: &[(String, i64)]) -> Result<(), StoreError> {
        self.mutate(|store| store.set_sort_orders(orders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_rule(rule_id: &str, sort_order: i64) -> NewRule {
        NewRule {
            rule_id: rule_id.into(),
            description: format!("{rule_id} rule"),
            pattern: "x".into(),
            replacement: "y".into(),
            sort_order,
        }
    }

    #[test]
    fn find_all_orders_by_sort_order_then_creation() {
        let mut store = MemoryStore::new();
        store.create(new_rule("late", 2)).unwrap();
        store.create(new_rule("first", 1)).unwrap();
        store.create(new_rule("second", 1)).unwrap();
        let ids: Vec<String> = store
            .find_all(false)
            .unwrap()
            .into_iter()
            .map(|r| r.rule_id)
            .collect();
        assert_eq!(ids, vec!["first", "second", "late"]);
    }

    #[test]
    fn enabled_view_hides_disabled_rules() {
        let mut store = MemoryStore::new();
        let a = store.create(new_rule("a", 1)).unwrap();
        store.create(new_rule("b", 2)).unwrap();
        store
            .update(
                &a.id,
                RulePatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(store.find_all(true).unwrap().len(), 1);
        assert_eq!(store.find_all(false).unwrap().len(), 2);
    }

    #[test]
    fn duplicate_rule_ids_are_rejected() {
        let mut store = MemoryStore::new();
        store.create(new_rule("dash", 1)).unwrap();
        assert!(matches!(
            store.create(new_rule("dash", 2)),
            Err(StoreError::Duplicate(id)) if id == "dash"
        ));
    }

    #[test]
    fn create_many_is_partial() {
        let mut store = MemoryStore::new();
        store.create(new_rule("taken", 1)).unwrap();
        let outcome = store
            .create_many(vec![new_rule("fresh", 2), new_rule("taken", 3)])
            .unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].rule_id, "taken");
    }

    #[test]
    fn empty_patch_returns_row_untouched() {
        let mut store = MemoryStore::new();
        let created = store.create(new_rule("a", 1)).unwrap();
        let same = store.update(&created.id, RulePatch::default()).unwrap();
        assert_eq!(same, created);
    }

    #[test]
    fn set_sort_orders_is_all_or_nothing() {
        let mut store = MemoryStore::new();
        let a = store.create(new_rule("a", 1)).unwrap();
        let b = store.create(new_rule("b", 2)).unwrap();
        assert!(matches!(
            store.set_sort_orders(&[(a.id.clone(), 5), ("nope".into(), 6)]),
            Err(StoreError::NotFound)
        ));
        assert_eq!(store.find_by_id(&a.id).unwrap().unwrap().sort_order, 1);

        store
            .set_sort_orders(&[(a.id.clone(), 2), (b.id.clone(), 1)])
            .unwrap();
        let ids: Vec<String> = store
            .find_all(false)
            .unwrap()
            .into_iter()
            .map(|r| r.rule_id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn missing_ids_are_not_found() {
        let mut store = MemoryStore::new();
        assert!(matches!(store.delete("nope"), Err(StoreError::NotFound)));
        assert!(matches!(
            store.update(
                "nope",
                RulePatch {
                    enabled: Some(true),
                    ..Default::default()
                }
            ),
            Err(StoreError::NotFound)
        ));
    }
}
