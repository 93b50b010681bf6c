//! Store methods for punishment policies. Insert-only.

use super::{corrupt, instant_column, money_column, money_to_sql, AppraisalStore};
use crate::{
    error::AppraisalResult,
    punishment::{KindFactors, PunishmentPolicy},
    types::RecordId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const POLICY_COLUMNS: &str =
    "id, jewelry_factor, diamond_factor, complementary_factor, effective_at";

struct PolicyRow {
    id:           RecordId,
    factors:      KindFactors,
    effective_at: DateTime<Utc>,
}

impl PolicyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            factors: KindFactors {
                jewelry:       money_column(row, 1)?,
                diamond:       money_column(row, 2)?,
                complementary: money_column(row, 3)?,
            },
            effective_at: instant_column(row, 4)?,
        })
    }

    fn into_policy(self) -> AppraisalResult<PunishmentPolicy> {
        PunishmentPolicy::stored(self.id, self.factors, self.effective_at)
            .map_err(|e| corrupt("punishment_policy", self.id, e))
    }
}

impl AppraisalStore {
    pub fn insert_punishment_policy(
        &self,
        policy:     &PunishmentPolicy,
        created_at: DateTime<Utc>,
    ) -> AppraisalResult<RecordId> {
        let f = policy.factors();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO punishment_policy (
                jewelry_factor, diamond_factor, complementary_factor, effective_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                money_to_sql(f.jewelry),
                money_to_sql(f.diamond),
                money_to_sql(f.complementary),
                policy.effective_at.timestamp_millis(),
                created_at.timestamp_millis(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Greatest `effective_at <= at_millis`; ties go to the later insert.
    pub fn latest_punishment_policy(&self, at_millis: i64) -> AppraisalResult<Option<PunishmentPolicy>> {
        let row = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {POLICY_COLUMNS} FROM punishment_policy
                     WHERE effective_at <= ?1
                     ORDER BY effective_at DESC, id DESC LIMIT 1"
                ),
                params![at_millis],
                PolicyRow::from_row,
            )
            .optional()?;
        row.map(PolicyRow::into_policy).transpose()
    }

    /// Earliest `effective_at` strictly after `at_millis`, if any policy is
    /// still pending.
    pub fn next_punishment_policy_after(&self, at_millis: i64) -> AppraisalResult<Option<DateTime<Utc>>> {
        let next = self
            .conn()
            .query_row(
                "SELECT effective_at FROM punishment_policy
                 WHERE effective_at > ?1
                 ORDER BY effective_at LIMIT 1",
                params![at_millis],
                |row| instant_column(row, 0),
            )
            .optional()?;
        Ok(next)
    }

    /// Policies with `start <= effective_at <= end`, newest first.
    pub fn punishment_policies_between(
        &self,
        start_millis: i64,
        end_millis:   i64,
    ) -> AppraisalResult<Vec<PunishmentPolicy>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {POLICY_COLUMNS} FROM punishment_policy
             WHERE effective_at BETWEEN ?1 AND ?2
             ORDER BY effective_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(params![start_millis, end_millis], PolicyRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(PolicyRow::into_policy).collect()
    }

    pub fn all_punishment_policies(&self) -> AppraisalResult<Vec<PunishmentPolicy>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {POLICY_COLUMNS} FROM punishment_policy
             ORDER BY effective_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map([], PolicyRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(PolicyRow::into_policy).collect()
    }

    pub fn punishment_policy_count(&self) -> AppraisalResult<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM punishment_policy",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
