//! Store methods for tunable business parameters.

use super::{money_column, money_to_sql, AppraisalStore};
use crate::{error::AppraisalResult, types::Money};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl AppraisalStore {
    pub fn parameter_value(
        &self,
        scope:   &str,
        key:     &str,
        filters: &str,
    ) -> AppraisalResult<Option<Money>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM parameter
                 WHERE scope = ?1 AND key = ?2 AND filters = ?3",
                params![scope, key, filters],
                |row| money_column(row, 0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn upsert_parameter(
        &self,
        scope:      &str,
        key:        &str,
        filters:    &str,
        value:      Money,
        updated_at: DateTime<Utc>,
    ) -> AppraisalResult<()> {
        self.conn().execute(
            "INSERT INTO parameter (scope, key, filters, value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (scope, key, filters)
             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![scope, key, filters, money_to_sql(value), updated_at.timestamp_millis()],
        )?;
        Ok(())
    }

    pub fn parameter_count(&self) -> AppraisalResult<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM parameter",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
