//! Condition-modifier store — versioned {condition code → factor} lists.
//!
//! Exactly one list is current at any time. `update` moves the current
//! list into the historical trail and installs the new one inside a single
//! datastore transaction, so no reader sees zero or two current lists.
//! More than one current list is data corruption and is reported as such,
//! never resolved by picking one.

use crate::{
    cache::KeyedCache,
    clock::{day_window_millis, Clock},
    error::{AppraisalError, AppraisalResult},
    piece::{require_code, require_positive},
    store::AppraisalStore,
    types::{Money, RecordId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConditionModifier {
    pub condition_code: String,
    pub factor:         Money,
}

impl ConditionModifier {
    pub fn new(condition_code: impl Into<String>, factor: Money) -> Self {
        Self {
            condition_code: condition_code.into(),
            factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionModifierList {
    #[serde(default)]
    pub id: Option<RecordId>,
    /// Assigned by the store when the list becomes current.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    pub source_date: NaiveDate,
    pub modifiers: BTreeSet<ConditionModifier>,
}

impl ConditionModifierList {
    /// Build an unsaved list.
    pub fn new(
        source_date: NaiveDate,
        modifiers: impl IntoIterator<Item = ConditionModifier>,
    ) -> AppraisalResult<Self> {
        let list = Self {
            id: None,
            last_updated: None,
            source_date,
            modifiers: modifiers.into_iter().collect(),
        };
        list.validate()?;
        Ok(list)
    }

    pub fn validate(&self) -> AppraisalResult<()> {
        if self.modifiers.is_empty() {
            return Err(AppraisalError::invalid("condition modifier list must not be empty"));
        }
        let mut seen = HashSet::new();
        for m in &self.modifiers {
            require_code("condition code", &m.condition_code)?;
            require_positive(&format!("condition '{}' factor", m.condition_code), m.factor)?;
            if !seen.insert(m.condition_code.as_str()) {
                return Err(AppraisalError::invalid(format!(
                    "condition code '{}' appears more than once",
                    m.condition_code
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, condition_code: &str) -> Option<&ConditionModifier> {
        self.modifiers
            .iter()
            .find(|m| m.condition_code == condition_code)
    }

    /// Equal source date and modifier set, ignoring store-assigned fields.
    pub fn same_content(&self, other: &ConditionModifierList) -> bool {
        self.source_date == other.source_date && self.modifiers == other.modifiers
    }
}

/// A list that was current once, as preserved in the historical trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedConditionModifierList {
    pub history_id:  RecordId,
    pub list:        ConditionModifierList,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConditionCacheKey {
    Current,
}

pub struct ConditionModifierRegistry {
    store: Arc<AppraisalStore>,
    clock: Arc<dyn Clock>,
    cache: KeyedCache<ConditionCacheKey, ConditionModifierList>,
}

impl ConditionModifierRegistry {
    pub fn new(store: Arc<AppraisalStore>, clock: Arc<dyn Clock>, cache_ttl: Option<Duration>) -> Self {
        Self {
            store,
            clock,
            cache: KeyedCache::new(cache_ttl),
        }
    }

    /// The single current list.
    pub fn current_list(&self) -> AppraisalResult<ConditionModifierList> {
        if let Some(hit) = self.cache.get(&ConditionCacheKey::Current) {
            return Ok(hit);
        }
        let mut current = self.store.current_condition_lists()?;
        let list = match current.len() {
            0 => return Err(AppraisalError::NoCurrentConditionList),
            1 => current.remove(0),
            count => {
                log::error!("condition modifiers: {count} current lists found");
                return Err(AppraisalError::MultipleCurrentConditionLists { count });
            }
        };
        self.cache.insert(ConditionCacheKey::Current, list.clone());
        Ok(list)
    }

    /// Lists (current or archived) last updated on `date`, newest first.
    pub fn by_last_updated(&self, date: NaiveDate) -> AppraisalResult<Vec<ConditionModifierList>> {
        let today = self.clock.today();
        if date > today {
            return Err(AppraisalError::FutureDate { requested: date, today });
        }
        let (start, end) = day_window_millis(date);
        let mut lists = self.store.condition_lists_updated_between(start, end)?;
        lists.extend(
            self.store
                .archived_condition_lists_updated_between(start, end)?
                .into_iter()
                .map(|archived| archived.list),
        );
        if lists.is_empty() {
            return Err(AppraisalError::NoConditionListForDate { date });
        }
        lists.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(lists)
    }

    pub fn lookup_modifier(&self, condition_code: &str) -> AppraisalResult<ConditionModifier> {
        self.current_list()?
            .get(condition_code)
            .cloned()
            .ok_or_else(|| AppraisalError::ConditionModifierNotFound {
                code: condition_code.to_string(),
            })
    }

    /// Archive the current list and install `new_list` as current, in one
    /// transaction. Returns the installed list with its id and timestamp.
    pub fn update(&self, new_list: &ConditionModifierList) -> AppraisalResult<ConditionModifierList> {
        new_list.validate()?;
        let now = self.clock.now();
        let installed = self.store.replace_current_condition_list(new_list, now);
        // Invalidate regardless of outcome.
        self.cache.invalidate(&ConditionCacheKey::Current);
        let installed = installed?;
        log::info!(
            "condition modifiers: list {:?} (source {}) now current with {} modifiers",
            installed.id, installed.source_date, installed.modifiers.len()
        );
        Ok(installed)
    }

    /// The historical trail, most recently archived first.
    pub fn history(&self) -> AppraisalResult<Vec<ArchivedConditionModifierList>> {
        self.store.archived_condition_lists()
    }
}
