//! Parameter service — tunable business constants looked up by scope,
//! key and optional filters.

use crate::{
    clock::Clock,
    error::{AppraisalError, AppraisalResult},
    store::AppraisalStore,
    types::Money,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub trait ParameterService: Send + Sync {
    fn fetch_parameter(
        &self,
        scope:   &str,
        key:     &str,
        filters: &[(&str, &str)],
    ) -> AppraisalResult<Money>;
}

/// Canonical filter string: `k=v` pairs sorted by key, joined with `;`.
pub fn canonical_filters(filters: &[(&str, &str)]) -> String {
    let sorted: BTreeMap<&str, &str> = filters.iter().copied().collect();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k.trim(), v.trim()))
        .collect::<Vec<_>>()
        .join(";")
}

/// A parameter row as it appears in `parameters/parameters.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub scope: String,
    pub key:   String,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    pub value: Money,
}

impl ParameterEntry {
    pub fn canonical_filters(&self) -> String {
        let pairs: Vec<(&str, &str)> = self
            .filters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        canonical_filters(&pairs)
    }
}

/// Parameter service backed by the `parameter` table.
pub struct StoreParameterService {
    store: Arc<AppraisalStore>,
    clock: Arc<dyn Clock>,
}

impl StoreParameterService {
    pub fn new(store: Arc<AppraisalStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn set_parameter(&self, entry: &ParameterEntry) -> AppraisalResult<()> {
        if entry.scope.trim().is_empty() || entry.key.trim().is_empty() {
            return Err(AppraisalError::invalid("parameter scope and key must not be blank"));
        }
        self.store.upsert_parameter(
            &entry.scope,
            &entry.key,
            &entry.canonical_filters(),
            entry.value,
            self.clock.now(),
        )
    }

    pub fn is_empty(&self) -> AppraisalResult<bool> {
        Ok(self.store.parameter_count()? == 0)
    }
}

impl ParameterService for StoreParameterService {
    fn fetch_parameter(
        &self,
        scope:   &str,
        key:     &str,
        filters: &[(&str, &str)],
    ) -> AppraisalResult<Money> {
        let filters = canonical_filters(filters);
        match self.store.parameter_value(scope, key, &filters) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(AppraisalError::ParameterNotFound {
                scope: scope.to_string(),
                key:   key.to_string(),
                filters,
            }),
            Err(e) => {
                log::warn!("parameters: lookup {scope}/{key} failed: {e}");
                Err(AppraisalError::ParameterServiceUnavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_are_sorted_and_trimmed() {
        assert_eq!(canonical_filters(&[("metal", " AU"), ("color", "Y")]), "color=Y;metal=AU");
        assert_eq!(canonical_filters(&[]), "");
    }
}
